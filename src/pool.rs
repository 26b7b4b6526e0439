//! Core pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::EvictionPolicy;
use crate::factory::ResourceFactory;
use crate::handle::{HandleId, PooledHandle, Slot};
use crate::health::HealthStatus;
use crate::leak::{LeakMonitor, LeakWarning, find_leaks};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LEAK_EVENT_BUFFER: usize = 64;

/// Stand-in deadline for timeouts too large to add to `Instant::now()`
const UNBOUNDED_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// State shared between the pool, its handles and the leak monitor
pub(crate) struct PoolInner<F: ResourceFactory> {
    pub(crate) factory: F,
    pub(crate) config: PoolConfiguration,
    pub(crate) metrics: MetricsTracker,
    eviction: EvictionPolicy,
    capacity: usize,
    size: AtomicUsize,
    free: ArrayQueue<Slot<F::Resource>>,
    in_use: DashMap<HandleId, Instant>,
    closed: AtomicBool,
    next_id: AtomicU64,
    signal: Mutex<()>,
    available: Condvar,
    monitor: Mutex<Option<LeakMonitor>>,
    leak_tx: Sender<LeakWarning>,
    leak_rx: Receiver<LeakWarning>,
}

impl<F: ResourceFactory> PoolInner<F> {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn in_use_entries(&self) -> Vec<(HandleId, Instant)> {
        self.in_use.iter().map(|entry| (*entry.key(), *entry.value())).collect()
    }

    /// Claim one unit of capacity, failing if the pool is full
    fn try_reserve(&self) -> bool {
        self.size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |size| {
                (size < self.capacity).then_some(size + 1)
            })
            .is_ok()
    }

    /// Give back a reservation that did not turn into a live resource
    fn unreserve(&self) {
        self.size.fetch_sub(1, Ordering::SeqCst);
        self.notify_one();
    }

    /// Create a resource for a reservation the caller already holds
    fn create_reserved(&self) -> PoolResult<Slot<F::Resource>> {
        match self.factory.create() {
            Ok(raw) => {
                let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
                MetricsTracker::incr(&self.metrics.created);
                info!(pool = %self.config.name, handle = %id, "New resource");
                Ok(Slot::new(id, raw))
            }
            Err(err) => {
                self.unreserve();
                MetricsTracker::incr(&self.metrics.factory_failures);
                warn!(pool = %self.config.name, error = %err, "Failed to create resource");
                Err(PoolError::factory(err))
            }
        }
    }

    /// Decide whether an idle resource may be handed out again
    fn validate_idle(&self, mut slot: Slot<F::Resource>) -> Option<Slot<F::Resource>> {
        if slot.meta.is_expired(&self.eviction) {
            debug!(pool = %self.config.name, handle = %slot.id, "Retiring expired resource");
            self.really_close(slot);
            return None;
        }

        if self.factory.is_healthy(&mut slot.raw, self.config.validation_timeout) {
            return Some(slot);
        }

        MetricsTracker::incr(&self.metrics.validation_failures);
        warn!(
            pool = %self.config.name,
            handle = %slot.id,
            age_ms = slot.meta.age().as_millis() as u64,
            "Dropping failed resource"
        );
        self.really_close(slot);
        None
    }

    fn hand_out(self: &Arc<Self>, slot: Slot<F::Resource>) -> PooledHandle<F> {
        let now = Instant::now();
        self.in_use.insert(slot.id, now);
        MetricsTracker::incr(&self.metrics.acquired);
        debug!(pool = %self.config.name, handle = %slot.id, "Resource checked out");
        PooledHandle::new(slot, now, Arc::clone(self))
    }

    fn acquire(self: &Arc<Self>, timeout: Duration) -> PoolResult<PooledHandle<F>> {
        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + UNBOUNDED_WAIT);

        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            if let Some(slot) = self.free.pop() {
                // An evicted resource frees a slot, so fall through to the reservation step
                if let Some(slot) = self.validate_idle(slot) {
                    return self.finish_checkout(slot);
                }
                continue;
            }

            if self.try_reserve() {
                let slot = self.create_reserved()?;
                return self.finish_checkout(slot);
            }

            let mut guard = self.signal.lock();
            loop {
                if self.is_closed() {
                    return Err(PoolError::PoolClosed);
                }
                if self.has_room() {
                    break;
                }
                if self.available.wait_until(&mut guard, deadline).timed_out() {
                    if self.has_room() {
                        break;
                    }
                    return Err(self.timed_out(timeout));
                }
            }
        }
    }

    /// Hand out a resource unless the pool was shut down while it was being
    /// validated or created. Serialized with `shutdown` through the signal lock.
    fn finish_checkout(self: &Arc<Self>, slot: Slot<F::Resource>) -> PoolResult<PooledHandle<F>> {
        let guard = self.signal.lock();
        if self.is_closed() {
            drop(guard);
            debug!(pool = %self.config.name, handle = %slot.id, "Pool closed during checkout");
            self.really_close(slot);
            return Err(PoolError::PoolClosed);
        }
        let handle = self.hand_out(slot);
        drop(guard);
        Ok(handle)
    }

    fn has_room(&self) -> bool {
        !self.free.is_empty() || self.size.load(Ordering::SeqCst) < self.capacity
    }

    fn timed_out(&self, timeout: Duration) -> PoolError {
        MetricsTracker::incr(&self.metrics.acquire_timeouts);
        debug!(pool = %self.config.name, timeout_ms = timeout.as_millis() as u64, "Acquire timed out");
        PoolError::AcquireTimeout(timeout)
    }

    /// Return protocol for a released handle
    pub(crate) fn recycle(&self, mut slot: Slot<F::Resource>, broken: bool) {
        if self.in_use.remove(&slot.id).is_none() {
            warn!(pool = %self.config.name, handle = %slot.id, "Released resource was not checked out");
        }
        MetricsTracker::incr(&self.metrics.released);

        if self.is_closed() {
            self.really_close(slot);
            return;
        }

        if broken {
            MetricsTracker::incr(&self.metrics.validation_failures);
            warn!(pool = %self.config.name, handle = %slot.id, "Discarding resource marked broken");
            self.really_close(slot);
            return;
        }

        if let Err(err) = self.factory.reset(&mut slot.raw) {
            MetricsTracker::incr(&self.metrics.validation_failures);
            warn!(pool = %self.config.name, handle = %slot.id, error = %err, "Failed to reset resource");
            self.really_close(slot);
            return;
        }

        if self.config.validate_on_return
            && !self.factory.is_healthy(&mut slot.raw, self.config.validation_timeout)
        {
            MetricsTracker::incr(&self.metrics.validation_failures);
            warn!(pool = %self.config.name, handle = %slot.id, "Dropping failed resource on return");
            self.really_close(slot);
            return;
        }

        if slot.meta.is_past_ttl(&self.eviction) {
            debug!(pool = %self.config.name, handle = %slot.id, "Retiring expired resource");
            self.really_close(slot);
            return;
        }

        slot.meta.touch();
        let id = slot.id;
        if let Err(slot) = self.free.push(slot) {
            self.really_close(slot);
            return;
        }
        debug!(pool = %self.config.name, handle = %id, "Resource returned");
        self.notify_one();

        // A shutdown that drained the free set before our push left this resource behind
        if self.is_closed() {
            self.drain_free();
        }
    }

    /// Drop a detached resource from the books without closing it
    pub(crate) fn forget(&self, id: HandleId) {
        self.in_use.remove(&id);
        debug!(pool = %self.config.name, handle = %id, "Resource detached from pool");
        self.unreserve();
    }

    /// Permanently close a raw resource and free its slot
    fn really_close(&self, slot: Slot<F::Resource>) {
        info!(
            pool = %self.config.name,
            handle = %slot.id,
            age_ms = slot.meta.age().as_millis() as u64,
            "Closing resource"
        );
        if let Err(err) = self.factory.close(slot.raw) {
            warn!(pool = %self.config.name, handle = %slot.id, error = %err, "Failed to close resource");
        }
        MetricsTracker::incr(&self.metrics.closed);
        self.unreserve();
    }

    fn drain_free(&self) {
        while let Some(slot) = self.free.pop() {
            self.really_close(slot);
        }
    }

    fn notify_one(&self) {
        let _guard = self.signal.lock();
        self.available.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.signal.lock();
        self.available.notify_all();
    }

    fn warmup(&self, count: usize) -> PoolResult<usize> {
        let mut created = 0;
        for _ in 0..count.min(self.capacity) {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }
            if !self.try_reserve() {
                break;
            }
            let slot = self.create_reserved()?;
            if let Err(slot) = self.free.push(slot) {
                self.really_close(slot);
                break;
            }
            self.notify_one();
            if self.is_closed() {
                self.drain_free();
                return Err(PoolError::PoolClosed);
            }
            created += 1;
        }
        Ok(created)
    }

    fn shutdown(&self) {
        {
            let _guard = self.signal.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        info!(pool = %self.config.name, "Shutting down pool");

        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        self.drain_free();
        self.notify_all();

        let outstanding = self.in_use.len();
        if outstanding > 0 {
            info!(
                pool = %self.config.name,
                outstanding,
                "Resources still checked out will be closed on release"
            );
        }
    }
}

impl<F: ResourceFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().as_mut() {
            monitor.cancel();
        }
        self.closed.store(true, Ordering::SeqCst);
        self.drain_free();
    }
}

/// Bounded pool of resources created on demand by a [`ResourceFactory`].
///
/// Cloning a `Pool` is cheap and yields another reference to the same pool.
///
/// # Examples
///
/// ```
/// use resource_pool::{Pool, PoolConfiguration, ResourceFactory};
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// struct Sockets;
///
/// impl ResourceFactory for Sockets {
///     type Resource = Vec<u8>;
///     type Error = Infallible;
///     fn create(&self) -> Result<Vec<u8>, Infallible> { Ok(Vec::new()) }
///     fn is_healthy(&self, _: &mut Vec<u8>, _: Duration) -> bool { true }
/// }
///
/// let pool = Pool::new(Sockets, PoolConfiguration::new().with_max_pool_size(3)).unwrap();
/// {
///     let mut buf = pool.acquire().unwrap();
///     buf.push(1);
///     assert_eq!(pool.in_use_count(), 1);
/// }
/// assert_eq!(pool.free_count(), 1);
/// pool.shutdown();
/// ```
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> Pool<F> {
    /// Create a pool, starting the leak monitor and warming up if configured
    pub fn new(factory: F, config: PoolConfiguration) -> PoolResult<Self> {
        config.validate()?;

        let capacity = config.max_pool_size;
        let (leak_tx, leak_rx) = channel::bounded(LEAK_EVENT_BUFFER);
        let inner = Arc::new(PoolInner {
            factory,
            eviction: EvictionPolicy::from_config(&config),
            metrics: MetricsTracker::new(),
            capacity,
            size: AtomicUsize::new(0),
            free: ArrayQueue::new(capacity),
            in_use: DashMap::with_capacity(capacity),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            signal: Mutex::new(()),
            available: Condvar::new(),
            monitor: Mutex::new(None),
            leak_tx,
            leak_rx,
            config,
        });

        if let Some(threshold) = inner.config.leak_warning_threshold {
            match LeakMonitor::spawn(
                Arc::downgrade(&inner),
                threshold,
                inner.config.leak_check_interval,
                inner.leak_tx.clone(),
                &inner.config.name,
            ) {
                Ok(monitor) => *inner.monitor.lock() = Some(monitor),
                Err(err) => warn!(pool = %inner.config.name, error = %err, "Failed to start leak monitor"),
            }
        }

        let pool = Self { inner };

        if let Some(count) = pool.inner.config.warmup_size {
            if let Err(err) = pool.inner.warmup(count) {
                pool.shutdown();
                return Err(err);
            }
        }

        Ok(pool)
    }

    /// Check out a resource, waiting up to the configured acquire timeout
    pub fn acquire(&self) -> PoolResult<PooledHandle<F>> {
        self.inner.acquire(self.inner.config.acquire_timeout)
    }

    /// Check out a resource, waiting up to `timeout`
    pub fn acquire_with_timeout(&self, timeout: Duration) -> PoolResult<PooledHandle<F>> {
        self.inner.acquire(timeout)
    }

    /// Check out a resource only if one is free or can be created right away
    pub fn try_acquire(&self) -> Option<PooledHandle<F>> {
        self.inner.acquire(Duration::ZERO).ok()
    }

    /// Check out a resource without blocking the async runtime
    pub async fn acquire_async(&self) -> PoolResult<PooledHandle<F>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.acquire())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Pre-create up to `count` idle resources, bounded by capacity
    pub fn warmup(&self, count: usize) -> PoolResult<usize> {
        self.inner.warmup(count)
    }

    /// Warm up the pool on Tokio's blocking threads
    pub async fn warmup_async(&self, count: usize) -> PoolResult<usize> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.warmup(count))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Close every idle resource and refuse further acquisitions.
    ///
    /// Resources that are checked out are closed when their handles are released.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Live resources, free and in use
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::SeqCst)
    }

    pub fn free_count(&self) -> usize {
        self.inner.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.inner.in_use.len()
    }

    /// Checked-out resources and how long each has been held
    pub fn in_use_snapshot(&self) -> Vec<(HandleId, Duration)> {
        let now = Instant::now();
        self.inner
            .in_use_entries()
            .into_iter()
            .map(|(id, since)| (id, now.saturating_duration_since(since)))
            .collect()
    }

    /// Stream of leak warnings published by the leak monitor
    pub fn leak_warnings(&self) -> Receiver<LeakWarning> {
        self.inner.leak_rx.clone()
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Whether this pool's factory is of type `T`
    pub fn is_wrapper_for<T: Any>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<F>()
    }

    /// Borrow the factory as `T` if that is its type
    pub fn unwrap_as<T: Any>(&self) -> Option<&T> {
        (&self.inner.factory as &dyn Any).downcast_ref::<T>()
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        let suspected_leaks = match self.inner.config.leak_warning_threshold {
            Some(threshold) => {
                find_leaks(self.inner.in_use_entries(), threshold, Instant::now()).len()
            }
            None => 0,
        };
        HealthStatus::new(
            self.free_count(),
            self.in_use_count(),
            suspected_leaks,
            self.inner.capacity,
            self.is_closed(),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(
            self.free_count(),
            self.in_use_count(),
            self.size(),
            self.inner.capacity,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(&self, tags: Option<&HashMap<String, String>>) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), &self.inner.config.name, tags)
    }
}
