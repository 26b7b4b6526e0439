//! Leak detection example
//!
//! Run with `RUST_LOG=info cargo run --example leak_monitor` to see the warnings.

use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
use std::convert::Infallible;
use std::thread;
use std::time::Duration;

struct Files;

impl ResourceFactory for Files {
    type Resource = u32;
    type Error = Infallible;

    fn create(&self) -> Result<u32, Infallible> {
        Ok(3)
    }

    fn is_healthy(&self, _fd: &mut u32, _timeout: Duration) -> bool {
        true
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    let config = PoolConfiguration::new()
        .with_name("files")
        .with_max_pool_size(2)
        .with_leak_warning(Duration::from_millis(100))
        .with_leak_check_interval(Duration::from_millis(50));
    let pool = Pool::new(Files, config).unwrap();
    let warnings = pool.leak_warnings();

    let forgotten = pool.acquire().unwrap();
    thread::sleep(Duration::from_millis(300));

    for warning in warnings.try_iter() {
        println!("{} held for {:?}", warning.handle, warning.held);
    }
    println!("{:?}", pool.health_status().warnings);

    drop(forgotten);
    pool.shutdown();
}
