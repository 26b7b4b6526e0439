// This is just a binary wrapper - the actual library is in lib.rs
// Run demos with: cargo run --example basic

use resource_pool::{Pool, PoolConfiguration, PoolResult, ResourceFactory};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stand-in for a real connection factory
struct Sessions {
    opened: AtomicUsize,
}

impl ResourceFactory for Sessions {
    type Resource = usize;
    type Error = Infallible;

    fn create(&self) -> Result<usize, Infallible> {
        Ok(self.opened.fetch_add(1, Ordering::Relaxed))
    }

    fn is_healthy(&self, _session: &mut usize, _timeout: Duration) -> bool {
        true
    }
}

fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PoolConfiguration::from_env()?.with_name("demo");
    let pool = Pool::new(Sessions { opened: AtomicUsize::new(0) }, config)?;

    {
        let session = pool.acquire()?;
        info!(session = *session, "Got session");
    }

    info!(free = pool.free_count(), size = pool.size(), "Returned session");
    pool.shutdown();
    Ok(())
}
