//! # resource_pool
//!
//! Bounded, thread-safe pool for expensive external resources such as
//! database connections, sockets or file handles.
//!
//! ## Features
//!
//! - Hard capacity limit with lock-free slot reservation
//! - Blocking `acquire` with a per-call deadline, plus an async bridge
//! - Health check on reuse; broken resources are closed and replaced
//! - Automatic return of resources via RAII (Drop trait)
//! - Reset hook run on every release (e.g. transaction rollback)
//! - Background leak monitor for resources held too long
//! - Time-to-live and idle-timeout retirement
//! - Pool warm-up/pre-population
//! - Health status, metrics and Prometheus export
//! - Structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
//! use std::io;
//! use std::time::Duration;
//!
//! struct Connections;
//!
//! impl ResourceFactory for Connections {
//!     type Resource = String;
//!     type Error = io::Error;
//!
//!     fn create(&self) -> io::Result<String> {
//!         Ok("connected".to_string())
//!     }
//!
//!     fn is_healthy(&self, conn: &mut String, _timeout: Duration) -> bool {
//!         conn.as_str() == "connected"
//!     }
//! }
//!
//! let pool = Pool::new(Connections, PoolConfiguration::default()).unwrap();
//! {
//!     let conn = pool.acquire().unwrap();
//!     println!("Got: {}", conn.as_str());
//!     // Resource automatically returned when `conn` goes out of scope
//! }
//! pool.shutdown();
//! ```

mod config;
mod errors;
mod eviction;
mod factory;
mod handle;
mod health;
mod leak;
mod metrics;
mod pool;

pub use config::PoolConfiguration;
pub use errors::{PoolError, PoolResult};
pub use eviction::EvictionPolicy;
pub use factory::ResourceFactory;
pub use handle::{HandleId, PooledHandle};
pub use health::HealthStatus;
pub use leak::LeakWarning;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
