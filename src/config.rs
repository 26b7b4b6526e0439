//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

const DEFAULT_WORKERS: usize = 5;
const DEFAULT_JOB_WORKERS: usize = 5;

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use resource_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_pool_size(20)
///     .with_acquire_timeout(Duration::from_secs(2))
///     .with_leak_warning(Duration::from_secs(30));
///
/// assert_eq!(config.max_pool_size, 20);
/// assert_eq!(config.leak_warning_threshold, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Name used in log events and exported metrics
    pub name: String,

    /// Maximum number of live resources, free and in use together
    pub max_pool_size: usize,

    /// How long `acquire` waits for a free resource when the pool is at capacity
    pub acquire_timeout: Duration,

    /// Upper bound passed to the factory's health check on reuse
    pub validation_timeout: Duration,

    /// Whether to health-check resources when they are released
    pub validate_on_return: bool,

    /// Held duration after which an in-use resource is reported as a possible leak
    pub leak_warning_threshold: Option<Duration>,

    /// How often the leak monitor scans the in-use set
    pub leak_check_interval: Duration,

    /// Maximum age of a resource before it is closed instead of reused
    pub time_to_live: Option<Duration>,

    /// Maximum idle time of a free resource before it is closed instead of reused
    pub idle_timeout: Option<Duration>,

    /// Number of resources to create when the pool is built
    pub warmup_size: Option<usize>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            max_pool_size: DEFAULT_WORKERS + DEFAULT_JOB_WORKERS,
            acquire_timeout: Duration::from_secs(5),
            validation_timeout: Duration::from_secs(1),
            validate_on_return: false,
            leak_warning_threshold: None,
            leak_check_interval: Duration::from_secs(1),
            time_to_live: None,
            idle_timeout: None,
            warmup_size: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from process environment variables prefixed with `DB_POOL`
    pub fn from_env() -> PoolResult<Self> {
        Self::from_lookup("DB_POOL", |key| std::env::var(key).ok())
    }

    /// Build a configuration from a key lookup.
    ///
    /// Recognised keys are `{prefix}_SIZE`, `{prefix}_TIMEOUT_MS` and
    /// `{prefix}_LEAK_WARNING_MS`. Without an explicit size the capacity is
    /// `NUM_WORKERS + JOB_WORKERS`, each defaulting to 5.
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::PoolConfiguration;
    /// use std::collections::HashMap;
    ///
    /// let env = HashMap::from([("NUM_WORKERS", "8"), ("APP_POOL_TIMEOUT_MS", "250")]);
    /// let config = PoolConfiguration::from_lookup("APP_POOL", |key| {
    ///     env.get(key).map(|v| v.to_string())
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.max_pool_size, 13);
    /// assert_eq!(config.acquire_timeout.as_millis(), 250);
    /// ```
    pub fn from_lookup<L>(prefix: &str, lookup: L) -> PoolResult<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> PoolResult<Option<u64>> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| PoolError::invalid(key, raw)),
                None => Ok(None),
            }
        };

        let mut config = Self::default();

        config.max_pool_size = match parse(&format!("{prefix}_SIZE"))? {
            Some(size) => size as usize,
            None => {
                let workers = parse("NUM_WORKERS")?.map_or(DEFAULT_WORKERS, |n| n as usize);
                let jobs = parse("JOB_WORKERS")?.map_or(DEFAULT_JOB_WORKERS, |n| n as usize);
                workers + jobs
            }
        };
        if config.max_pool_size == 0 {
            return Err(PoolError::invalid(format!("{prefix}_SIZE"), "0"));
        }

        if let Some(ms) = parse(&format!("{prefix}_TIMEOUT_MS"))? {
            config.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&format!("{prefix}_LEAK_WARNING_MS"))? {
            config.leak_warning_threshold = Some(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Set the name reported in logs and metrics
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_max_pool_size(50);
    ///
    /// assert_eq!(config.max_pool_size, 50);
    /// ```
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set how long `acquire` may block
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the budget handed to the factory's health check
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Enable validation on return
    pub fn with_validate_on_return(mut self, enabled: bool) -> Self {
        self.validate_on_return = enabled;
        self
    }

    /// Enable the leak monitor with the given threshold
    pub fn with_leak_warning(mut self, threshold: Duration) -> Self {
        self.leak_warning_threshold = Some(threshold);
        self
    }

    /// Set the leak monitor's scan interval
    pub fn with_leak_check_interval(mut self, interval: Duration) -> Self {
        self.leak_check_interval = interval;
        self
    }

    /// Set time-to-live for resources
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Set idle timeout for resources
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set warm-up size
    pub fn with_warmup(mut self, size: usize) -> Self {
        self.warmup_size = Some(size);
        self
    }

    pub(crate) fn validate(&self) -> PoolResult<()> {
        if self.max_pool_size == 0 {
            return Err(PoolError::invalid("max_pool_size", "0"));
        }
        if self.leak_check_interval.is_zero() {
            return Err(PoolError::invalid("leak_check_interval", "0s"));
        }
        Ok(())
    }
}
