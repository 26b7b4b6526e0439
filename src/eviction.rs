//! Age-based retirement of pooled resources

use crate::config::PoolConfiguration;
use std::time::{Duration, Instant};

/// Eviction policy for pooled resources
///
/// # Examples
///
/// ```
/// use resource_pool::{EvictionPolicy, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_ttl(Duration::from_secs(3600));
///
/// // Resources are closed instead of reused once they are an hour old
/// assert!(matches!(EvictionPolicy::from_config(&config), EvictionPolicy::TimeToLive(_)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// No eviction
    #[default]
    None,

    /// Time-to-live: resources expire a fixed duration after creation
    TimeToLive(Duration),

    /// Idle timeout: resources expire after sitting in the free set too long
    IdleTimeout(Duration),

    /// Combined: TTL or idle timeout
    Combined {
        ttl: Duration,
        idle_timeout: Duration,
    },
}

impl EvictionPolicy {
    pub fn from_config(config: &PoolConfiguration) -> Self {
        match (config.time_to_live, config.idle_timeout) {
            (Some(ttl), Some(idle_timeout)) => EvictionPolicy::Combined { ttl, idle_timeout },
            (Some(ttl), None) => EvictionPolicy::TimeToLive(ttl),
            (None, Some(idle)) => EvictionPolicy::IdleTimeout(idle),
            (None, None) => EvictionPolicy::None,
        }
    }

    fn ttl(&self) -> Option<Duration> {
        match *self {
            EvictionPolicy::TimeToLive(ttl) | EvictionPolicy::Combined { ttl, .. } => Some(ttl),
            _ => None,
        }
    }
}

/// Lifecycle timestamps carried by every pooled resource
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceMetadata {
    pub created_at: Instant,
    pub last_used: Instant,
}

impl ResourceMetadata {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_used: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether an idle resource should be closed rather than handed out
    pub fn is_expired(&self, policy: &EvictionPolicy) -> bool {
        match policy {
            EvictionPolicy::None => false,
            EvictionPolicy::TimeToLive(ttl) => self.created_at.elapsed() > *ttl,
            EvictionPolicy::IdleTimeout(timeout) => self.last_used.elapsed() > *timeout,
            EvictionPolicy::Combined { ttl, idle_timeout } => {
                self.created_at.elapsed() > *ttl || self.last_used.elapsed() > *idle_timeout
            }
        }
    }

    /// Whether a resource coming back from a caller is past its lifetime.
    /// Idle time does not apply here since the resource was just in use.
    pub fn is_past_ttl(&self, policy: &EvictionPolicy) -> bool {
        policy.ttl().is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}
