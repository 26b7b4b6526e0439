//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// struct Counter;
///
/// impl ResourceFactory for Counter {
///     type Resource = u32;
///     type Error = Infallible;
///     fn create(&self) -> Result<u32, Infallible> { Ok(0) }
///     fn is_healthy(&self, _: &mut u32, _: Duration) -> bool { true }
/// }
///
/// let pool = Pool::new(Counter, PoolConfiguration::new().with_max_pool_size(2)).unwrap();
/// {
///     let _handle = pool.acquire().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_created, 1);
///     assert_eq!(metrics.in_use, 1);
/// }
/// assert_eq!(pool.get_metrics().total_released, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolMetrics {
    /// Raw resources opened by the factory
    pub total_created: usize,

    /// Raw resources closed, for any reason
    pub total_closed: usize,

    /// Successful acquisitions
    pub total_acquired: usize,

    /// Handles returned to the pool
    pub total_released: usize,

    /// Resources dropped because a health check or reset failed
    pub validation_failures: usize,

    /// Acquisitions that gave up at the deadline
    pub acquire_timeouts: usize,

    /// Factory `create` calls that failed
    pub factory_failures: usize,

    /// Leak warnings emitted by the leak monitor
    pub leak_warnings: usize,

    /// Live resources, free and in use
    pub size: usize,

    /// Idle resources waiting in the free set
    pub free: usize,

    /// Resources currently checked out
    pub in_use: usize,

    /// Maximum pool capacity
    pub max_capacity: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("acquire_timeouts".to_string(), self.acquire_timeouts.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("leak_warnings".to_string(), self.leak_warnings.to_string());
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("free".to_string(), self.free.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("resourcepool_size", "Live resources, free and in use", metrics.size as f64),
            ("resourcepool_free", "Idle resources in the free set", metrics.free as f64),
            ("resourcepool_in_use", "Resources currently checked out", metrics.in_use as f64),
            ("resourcepool_utilization", "Pool utilization ratio", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        let counters = [
            ("resourcepool_created_total", "Resources opened", metrics.total_created),
            ("resourcepool_closed_total", "Resources closed", metrics.total_closed),
            ("resourcepool_acquired_total", "Successful acquisitions", metrics.total_acquired),
            ("resourcepool_released_total", "Handles released", metrics.total_released),
            (
                "resourcepool_validation_failures_total",
                "Resources dropped after failed validation",
                metrics.validation_failures,
            ),
            (
                "resourcepool_acquire_timeouts_total",
                "Acquisitions that timed out",
                metrics.acquire_timeouts,
            ),
            (
                "resourcepool_factory_failures_total",
                "Failed resource creations",
                metrics.factory_failures,
            ),
            ("resourcepool_leak_warnings_total", "Possible leaks reported", metrics.leak_warnings),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub validation_failures: AtomicUsize,
    pub acquire_timeouts: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub leak_warnings: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, free: usize, in_use: usize, size: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.created.load(Ordering::Relaxed),
            total_closed: self.closed.load(Ordering::Relaxed),
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            leak_warnings: self.leak_warnings.load(Ordering::Relaxed),
            size,
            free,
            in_use,
            max_capacity: capacity,
            utilization,
        }
    }
}
