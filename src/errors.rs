//! Error types for the resource pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a pooled resource")]
    AcquireTimeout(Duration),

    #[error("Failed to create resource: {0}")]
    Factory(#[source] Arc<dyn StdError + Send + Sync>),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfiguration { key: String, value: String },

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn factory<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PoolError::Factory(Arc::new(err))
    }

    pub(crate) fn invalid(key: impl Into<String>, value: impl Into<String>) -> Self {
        PoolError::InvalidConfiguration {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the caller may reasonably retry the same operation later
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::AcquireTimeout(_) | PoolError::Factory(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
