//! Health reporting for resource pools

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Health status of a pool
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Whether the pool has been shut down
    pub is_closed: bool,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle resources
    pub free_resources: usize,

    /// Checked-out resources
    pub in_use_resources: usize,

    /// Checked-out resources held past the leak threshold
    pub suspected_leaks: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub(crate) fn new(
        free: usize,
        in_use: usize,
        suspected_leaks: usize,
        capacity: usize,
        is_closed: bool,
    ) -> Self {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = !is_closed;

        if is_closed {
            warnings.push("Pool is closed".to_string());
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if free == 0 && in_use >= capacity && capacity > 0 {
            warnings.push("Pool is exhausted".to_string());
        }

        if suspected_leaks > 0 {
            warnings.push(format!("{suspected_leaks} resource(s) held past the leak threshold"));
        }

        Self {
            is_healthy,
            is_closed,
            utilization,
            free_resources: free,
            in_use_resources: in_use,
            suspected_leaks,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
