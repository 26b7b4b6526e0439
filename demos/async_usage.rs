//! Async usage examples

use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Workers;

impl ResourceFactory for Workers {
    type Resource = String;
    type Error = Infallible;

    fn create(&self) -> Result<String, Infallible> {
        Ok("worker".to_string())
    }

    fn is_healthy(&self, _worker: &mut String, _timeout: Duration) -> bool {
        true
    }
}

#[tokio::main]
async fn main() {
    println!("=== resource_pool - Async Examples ===\n");

    // Example 1: Async acquire with timeout
    async_with_timeout().await;

    // Example 2: Warm-up
    warmup().await;

    // Example 3: Concurrent access
    concurrent_access().await;
}

async fn async_with_timeout() {
    println!("1. Async with Timeout:");

    let config = PoolConfiguration::new()
        .with_max_pool_size(1)
        .with_acquire_timeout(Duration::from_millis(100));
    let pool = Pool::new(Workers, config).unwrap();

    let _held = pool.acquire_async().await.unwrap();

    match pool.acquire_async().await {
        Ok(_) => println!("   Got worker"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn warmup() {
    println!("2. Warm-up:");

    let pool = Pool::new(Workers, PoolConfiguration::new().with_max_pool_size(10)).unwrap();
    let created = pool.warmup_async(5).await.unwrap();
    println!("   Pre-created {} workers, free: {}", created, pool.free_count());

    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");

    let config = PoolConfiguration::new()
        .with_max_pool_size(3)
        .with_acquire_timeout(Duration::from_secs(1));
    let pool = Arc::new(Pool::new(Workers, config).unwrap());

    let mut tasks = vec![];
    for i in 0..10 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            match pool.acquire_async().await {
                Ok(worker) => {
                    println!("   Task {} got {} #{}", i, worker.as_str(), worker.id());
                    sleep(Duration::from_millis(50)).await;
                }
                Err(e) => println!("   Task {} failed: {}", i, e),
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    println!("   Final free: {}, created: {}", pool.free_count(), pool.get_metrics().total_created);
}
