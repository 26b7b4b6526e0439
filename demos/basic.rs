//! Basic usage examples for Pool

use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Pretend database: every connection is just a numbered session
#[derive(Default)]
struct FakeDatabase {
    sessions: AtomicUsize,
}

struct Session {
    id: usize,
}

impl Session {
    fn query(&self, sql: &str) -> String {
        format!("session {} ran `{}`", self.id, sql)
    }
}

impl ResourceFactory for FakeDatabase {
    type Resource = Session;
    type Error = io::Error;

    fn create(&self) -> io::Result<Session> {
        let id = self.sessions.fetch_add(1, Ordering::Relaxed);
        println!("   Opening session {}", id);
        Ok(Session { id })
    }

    fn is_healthy(&self, _session: &mut Session, _timeout: Duration) -> bool {
        true
    }
}

fn main() {
    println!("=== resource_pool - Basic Examples ===\n");

    // Example 1: Acquire and release
    simple_pool();

    // Example 2: Try methods
    try_methods();

    // Example 3: Metrics and health
    metrics_and_health();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = Pool::new(FakeDatabase::default(), PoolConfiguration::new().with_max_pool_size(3)).unwrap();

    {
        let session = pool.acquire().unwrap();
        println!("   {}", session.query("select 1"));
        // Session automatically returned when dropped
    }

    println!("   Free after return: {}\n", pool.free_count());
    pool.shutdown();
}

fn try_methods() {
    println!("2. Try Methods:");
    let pool = Pool::new(FakeDatabase::default(), PoolConfiguration::new().with_max_pool_size(1)).unwrap();

    let first = pool.try_acquire();
    assert!(first.is_some());
    println!("   First try: Success");

    let second = pool.try_acquire();
    assert!(second.is_none());
    println!("   Second try: None (pool exhausted)");

    drop(first);

    let third = pool.try_acquire();
    assert!(third.is_some());
    println!("   Third try: Success (same session reused)\n");
}

fn metrics_and_health() {
    println!("3. Metrics and Health:");
    let pool = Pool::new(FakeDatabase::default(), PoolConfiguration::new().with_max_pool_size(5)).unwrap();

    {
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        let health = pool.health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   In use: {}, Free: {}", health.in_use_resources, health.free_resources);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
