//! The contract between the pool and whatever creates its resources

use std::error::Error as StdError;
use std::time::Duration;

/// Creates, validates and closes the raw resources a [`Pool`](crate::Pool) manages.
///
/// Only [`create`](ResourceFactory::create) and
/// [`is_healthy`](ResourceFactory::is_healthy) are required. Closing defaults
/// to dropping the resource, and resetting defaults to a no-op.
///
/// # Examples
///
/// ```
/// use resource_pool::ResourceFactory;
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// struct Buffers;
///
/// impl ResourceFactory for Buffers {
///     type Resource = Vec<u8>;
///     type Error = Infallible;
///
///     fn create(&self) -> Result<Vec<u8>, Infallible> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn is_healthy(&self, buf: &mut Vec<u8>, _timeout: Duration) -> bool {
///         buf.capacity() >= 4096
///     }
///
///     fn reset(&self, buf: &mut Vec<u8>) -> Result<(), Infallible> {
///         buf.clear();
///         Ok(())
///     }
/// }
/// ```
pub trait ResourceFactory: Send + Sync + 'static {
    /// The raw resource being pooled
    type Resource: Send + 'static;

    /// Error returned when creating, resetting or closing fails
    type Error: StdError + Send + Sync + 'static;

    /// Open a new raw resource
    fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Probe whether `resource` is still usable, giving up after roughly `timeout`
    fn is_healthy(&self, resource: &mut Self::Resource, timeout: Duration) -> bool;

    /// Bring a released resource back to a clean, reusable state.
    ///
    /// For database connections this is where an open transaction gets
    /// rolled back. An error discards the resource.
    fn reset(&self, resource: &mut Self::Resource) -> Result<(), Self::Error> {
        let _ = resource;
        Ok(())
    }

    /// Permanently close a raw resource
    fn close(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        drop(resource);
        Ok(())
    }
}
