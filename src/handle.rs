//! The caller-facing wrapper around a checked-out resource

use crate::eviction::ResourceMetadata;
use crate::factory::ResourceFactory;
use crate::pool::PoolInner;

use std::any::{Any, TypeId};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stable identity of a pooled resource, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw resource plus the bookkeeping that travels with it between the
/// free set and callers.
pub(crate) struct Slot<R> {
    pub id: HandleId,
    pub raw: R,
    pub meta: ResourceMetadata,
}

impl<R> Slot<R> {
    pub fn new(id: HandleId, raw: R) -> Self {
        Self {
            id,
            raw,
            meta: ResourceMetadata::new(),
        }
    }
}

/// A checked-out resource that returns to its pool when dropped.
///
/// Dereferences to the raw resource, so the resource's own methods are
/// available directly on the handle.
pub struct PooledHandle<F: ResourceFactory> {
    slot: Option<Slot<F::Resource>>,
    checked_out_at: Instant,
    broken: bool,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> PooledHandle<F> {
    pub(crate) fn new(slot: Slot<F::Resource>, checked_out_at: Instant, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            slot: Some(slot),
            checked_out_at,
            broken: false,
            pool,
        }
    }

    fn slot(&self) -> &Slot<F::Resource> {
        self.slot.as_ref().expect("BUG: PooledHandle used after release")
    }

    pub fn id(&self) -> HandleId {
        self.slot().id
    }

    /// When the underlying resource was created
    pub fn created_at(&self) -> Instant {
        self.slot().meta.created_at
    }

    /// Time since the underlying resource was created
    pub fn age(&self) -> Duration {
        self.slot().meta.age()
    }

    pub fn checked_out_at(&self) -> Instant {
        self.checked_out_at
    }

    /// How long this handle has been held by the caller
    pub fn held_for(&self) -> Duration {
        self.checked_out_at.elapsed()
    }

    /// Flag the resource as unusable so it is closed instead of returned
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Return the resource to the pool. Equivalent to dropping the handle.
    pub fn release(self) {
        drop(self);
    }

    /// Take the raw resource out of the pool for good, freeing its slot.
    /// The pool will never close it.
    pub fn detach(mut self) -> F::Resource {
        let slot = self.slot.take().expect("BUG: PooledHandle used after release");
        self.pool.forget(slot.id);
        slot.raw
    }

    /// Whether the wrapped resource is of type `T`
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
    /// use std::convert::Infallible;
    /// use std::time::Duration;
    ///
    /// struct Names;
    ///
    /// impl ResourceFactory for Names {
    ///     type Resource = String;
    ///     type Error = Infallible;
    ///     fn create(&self) -> Result<String, Infallible> { Ok("conn".into()) }
    ///     fn is_healthy(&self, _: &mut String, _: Duration) -> bool { true }
    /// }
    ///
    /// let pool = Pool::new(Names, PoolConfiguration::new()).unwrap();
    /// let handle = pool.acquire().unwrap();
    /// assert!(handle.is_wrapper_for::<String>());
    /// assert_eq!(handle.unwrap_as::<String>().map(String::as_str), Some("conn"));
    /// assert!(handle.unwrap_as::<u64>().is_none());
    /// ```
    pub fn is_wrapper_for<T: Any>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<F::Resource>()
    }

    /// Borrow the wrapped resource as `T` if that is its type
    pub fn unwrap_as<T: Any>(&self) -> Option<&T> {
        (self.deref() as &dyn Any).downcast_ref::<T>()
    }

    pub fn unwrap_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        (self.deref_mut() as &mut dyn Any).downcast_mut::<T>()
    }
}

impl<F: ResourceFactory> Deref for PooledHandle<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        &self.slot().raw
    }
}

impl<F: ResourceFactory> DerefMut for PooledHandle<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .slot
            .as_mut()
            .expect("BUG: PooledHandle used after release")
            .raw
    }
}

impl<F: ResourceFactory> Drop for PooledHandle<F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.recycle(slot, self.broken);
        }
    }
}

impl<F: ResourceFactory> fmt::Display for PooledHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "PooledHandle#{}", slot.id),
            None => write!(f, "PooledHandle#released"),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for PooledHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("id", &self.slot.as_ref().map(|slot| slot.id))
            .field("held_for", &self.held_for())
            .field("broken", &self.broken)
            .finish()
    }
}
