use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use resource_pool::{Pool, PoolConfiguration, PoolError, ResourceFactory};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Conn {
    serial: usize,
    in_transaction: bool,
}

#[derive(Default)]
struct Backend {
    next: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    rollbacks: AtomicUsize,
    broken: Mutex<HashSet<usize>>,
    failing_close: Mutex<HashSet<usize>>,
    closed: Arc<Mutex<Vec<usize>>>,
    refuse_after: Option<usize>,
}

impl ResourceFactory for Backend {
    type Resource = Conn;
    type Error = io::Error;

    fn create(&self) -> io::Result<Conn> {
        if self.refuse_after.is_some_and(|limit| self.next.load(Ordering::SeqCst) >= limit) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "too many connections"));
        }
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Conn {
            serial: self.next.fetch_add(1, Ordering::SeqCst),
            in_transaction: false,
        })
    }

    fn is_healthy(&self, conn: &mut Conn, _timeout: Duration) -> bool {
        !self.broken.lock().contains(&conn.serial)
    }

    fn reset(&self, conn: &mut Conn) -> io::Result<()> {
        if conn.in_transaction {
            conn.in_transaction = false;
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close(&self, conn: Conn) -> io::Result<()> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.closed.lock().push(conn.serial);
        if self.failing_close.lock().contains(&conn.serial) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket already gone"));
        }
        Ok(())
    }
}

fn pool_with(capacity: usize, timeout: Duration) -> Pool<Backend> {
    let config = PoolConfiguration::new()
        .with_name("test")
        .with_max_pool_size(capacity)
        .with_acquire_timeout(timeout);
    Pool::new(Backend::default(), config).unwrap()
}

fn assert_consistent(pool: &Pool<Backend>) {
    assert_eq!(pool.size(), pool.free_count() + pool.in_use_count());
    assert!(pool.size() <= pool.capacity());
}

#[test]
fn concurrent_acquire_fills_capacity() {
    let pool = pool_with(3, Duration::from_secs(1));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().unwrap())
        })
        .collect();
    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(pool.in_use_count(), 3);
    assert_eq!(pool.free_count(), 0);
    assert_consistent(&pool);

    let serials: HashSet<usize> = handles.iter().map(|h| h.serial).collect();
    assert_eq!(serials.len(), 3);
}

#[test]
fn blocked_acquire_is_unblocked_by_release() {
    let pool = pool_with(3, Duration::from_millis(100));
    let held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    let held_ids: HashSet<_> = held.iter().map(|h| h.id()).collect();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire())
    };
    thread::sleep(Duration::from_millis(10));
    assert!(!waiter.is_finished());

    drop(held);

    let extra = waiter.join().unwrap().unwrap();
    assert!(held_ids.contains(&extra.id()));
    assert_eq!(pool.in_use_count(), 1);
    assert_eq!(pool.free_count(), 2);

    extra.release();
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 3);
    assert_eq!(pool.factory().next.load(Ordering::SeqCst), 3);
}

#[test]
fn single_release_hands_over_to_waiter() {
    let pool = pool_with(3, Duration::from_millis(500));
    let mut held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire())
    };
    thread::sleep(Duration::from_millis(10));

    let released = held.pop().unwrap();
    let released_id = released.id();
    released.release();

    let extra = waiter.join().unwrap().unwrap();
    assert_eq!(extra.id(), released_id);
    assert_eq!(pool.in_use_count(), 3);
    assert_eq!(pool.free_count(), 0);
    assert_consistent(&pool);
}

#[test]
fn exhausted_pool_times_out() {
    let pool = pool_with(2, Duration::from_millis(100));
    let _a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();

    let started = Instant::now();
    match pool.acquire() {
        Err(PoolError::AcquireTimeout(timeout)) => assert_eq!(timeout, Duration::from_millis(100)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(pool.in_use_count(), 2);
    assert_eq!(pool.get_metrics().acquire_timeouts, 1);
}

#[test]
fn shutdown_closes_released_resources() {
    let pool = pool_with(3, Duration::from_millis(100));
    let handles: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    drop(handles);

    assert_eq!(pool.free_count(), 3);
    assert_eq!(pool.in_use_count(), 0);

    pool.shutdown();

    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.size(), 0);
    let mut closed = pool.factory().closed.lock().clone();
    closed.sort();
    assert_eq!(closed, vec![0, 1, 2]);
}

#[test]
fn close_failures_do_not_stop_draining() {
    let pool = pool_with(3, Duration::from_millis(100));
    pool.warmup(3).unwrap();
    pool.factory().failing_close.lock().extend([0, 1]);

    pool.shutdown();

    assert_eq!(pool.factory().closed.lock().len(), 3);
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.get_metrics().total_closed, 3);
}

#[test]
fn failed_health_check_replaces_resource() {
    let pool = pool_with(2, Duration::from_millis(100));
    let first = pool.acquire().unwrap();
    let stale_serial = first.serial;
    first.release();

    pool.factory().broken.lock().insert(stale_serial);

    let fresh = pool.acquire().unwrap();
    assert_ne!(fresh.serial, stale_serial);
    assert_eq!(*pool.factory().closed.lock(), vec![stale_serial]);
    assert_eq!(pool.size(), 1);
    assert!(pool.size() <= pool.capacity());
    assert_eq!(pool.get_metrics().validation_failures, 1);
}

#[test]
fn healthy_reuse_returns_identical_resource() {
    let pool = pool_with(1, Duration::from_millis(100));
    let first = pool.acquire().unwrap();
    let (id, serial) = (first.id(), first.serial);
    first.release();

    let again = pool.acquire().unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(again.serial, serial);
    assert_eq!(pool.factory().next.load(Ordering::SeqCst), 1);
}

#[test]
fn release_rolls_back_open_transaction() {
    let pool = pool_with(1, Duration::from_millis(100));
    let mut conn = pool.acquire().unwrap();
    conn.in_transaction = true;
    conn.release();

    let conn = pool.acquire().unwrap();
    assert!(!conn.in_transaction);
    assert_eq!(pool.factory().rollbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn release_consumes_handle_once() {
    let pool = pool_with(2, Duration::from_millis(100));
    let handle = pool.acquire().unwrap();
    handle.release();

    assert_eq!(pool.get_metrics().total_released, 1);
    assert_eq!(pool.free_count(), 1);
    assert_eq!(pool.size(), 1);
    assert_consistent(&pool);
}

#[test]
fn contention_never_exceeds_capacity() {
    let pool = pool_with(3, Duration::from_secs(5));

    thread::scope(|scope| {
        for _ in 0..12 {
            let pool = &pool;
            scope.spawn(move || {
                for _ in 0..50 {
                    let conn = pool.acquire().unwrap();
                    assert!(pool.size() <= 3);
                    thread::yield_now();
                    drop(conn);
                }
            });
        }
    });

    assert!(pool.factory().max_live.load(Ordering::SeqCst) <= 3);
    assert!(pool.factory().next.load(Ordering::SeqCst) <= 3);
    assert_eq!(pool.in_use_count(), 0);
    assert_consistent(&pool);
    assert_eq!(pool.get_metrics().total_acquired, 12 * 50);
}

#[test]
fn shutdown_wakes_blocked_acquirers() {
    let pool = pool_with(1, Duration::from_secs(5));
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let started = Instant::now();
            (pool.acquire(), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(20));
    pool.shutdown();

    let (result, waited) = waiter.join().unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert!(waited < Duration::from_secs(1));

    drop(held);
    assert_eq!(pool.size(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
}

#[test]
fn leak_monitor_reports_long_held_handle() {
    let config = PoolConfiguration::new()
        .with_max_pool_size(2)
        .with_leak_warning(Duration::from_millis(50))
        .with_leak_check_interval(Duration::from_millis(20));
    let pool = Pool::new(Backend::default(), config).unwrap();
    let warnings = pool.leak_warnings();

    let handle = pool.acquire().unwrap();
    let leaked_id = handle.id();
    thread::sleep(Duration::from_millis(250));
    assert_eq!(pool.health_status().suspected_leaks, 1);
    drop(handle);

    let reports: Vec<_> = warnings.try_iter().collect();
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|w| w.handle == leaked_id));
    assert!(reports.iter().any(|w| w.held >= Duration::from_millis(150)));
    assert!(pool.get_metrics().leak_warnings >= reports.len());

    // Observational only: the resource went back to the free set untouched
    assert_eq!(pool.free_count(), 1);
    assert!(pool.factory().closed.lock().is_empty());
    pool.shutdown();
}

#[test]
fn leak_monitor_stops_on_shutdown() {
    let config = PoolConfiguration::new()
        .with_max_pool_size(1)
        .with_leak_warning(Duration::from_millis(1))
        .with_leak_check_interval(Duration::from_millis(10));
    let pool = Pool::new(Backend::default(), config).unwrap();
    let warnings = pool.leak_warnings();
    let handle = pool.acquire().unwrap();

    pool.shutdown();
    while warnings.try_recv().is_ok() {}
    thread::sleep(Duration::from_millis(50));

    assert!(warnings.try_recv().is_err());
    drop(handle);
}

#[test]
fn handle_forwards_and_introspects() {
    let pool = pool_with(1, Duration::from_millis(100));
    let mut conn = pool.acquire().unwrap();

    conn.in_transaction = true;
    assert!(conn.is_wrapper_for::<Conn>());
    assert!(!conn.is_wrapper_for::<String>());
    assert_eq!(conn.unwrap_as::<Conn>().map(|c| c.serial), Some(0));
    assert!(conn.unwrap_as_mut::<Conn>().is_some());
    assert!(conn.unwrap_as::<u32>().is_none());
    assert_eq!(conn.to_string(), format!("PooledHandle#{}", conn.id()));
    assert!(pool.unwrap_as::<Backend>().is_some());
}

#[test]
fn shared_pool_across_threads_via_arc() {
    let pool = Arc::new(pool_with(2, Duration::from_secs(1)));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().map(|conn| conn.serial))
        })
        .collect();
    for worker in workers {
        assert!(worker.join().unwrap().unwrap() < 2);
    }
    assert_eq!(pool.free_count(), 2);
}

/// Factory whose `create` and `reset` can be held open until the test lets them finish
struct Gated {
    next: AtomicUsize,
    hold_create: AtomicBool,
    hold_reset: AtomicBool,
    entered: Sender<()>,
    proceed: Receiver<()>,
    closed: Arc<Mutex<Vec<usize>>>,
}

impl Gated {
    fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = channel::unbounded();
        let (proceed_tx, proceed_rx) = channel::unbounded();
        let factory = Gated {
            next: AtomicUsize::new(0),
            hold_create: AtomicBool::new(false),
            hold_reset: AtomicBool::new(false),
            entered: entered_tx,
            proceed: proceed_rx,
            closed: Arc::default(),
        };
        (factory, entered_rx, proceed_tx)
    }

    fn gate(&self, hold: &AtomicBool) {
        if hold.load(Ordering::SeqCst) {
            self.entered.send(()).unwrap();
            self.proceed.recv().unwrap();
        }
    }
}

impl ResourceFactory for Gated {
    type Resource = usize;
    type Error = io::Error;

    fn create(&self) -> io::Result<usize> {
        self.gate(&self.hold_create);
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn is_healthy(&self, _serial: &mut usize, _timeout: Duration) -> bool {
        true
    }

    fn reset(&self, _serial: &mut usize) -> io::Result<()> {
        self.gate(&self.hold_reset);
        Ok(())
    }

    fn close(&self, serial: usize) -> io::Result<()> {
        self.closed.lock().push(serial);
        Ok(())
    }
}

fn gated_pool(capacity: usize) -> (Pool<Gated>, Receiver<()>, Sender<()>) {
    let (factory, entered, proceed) = Gated::new();
    let config = PoolConfiguration::new()
        .with_name("gated")
        .with_max_pool_size(capacity)
        .with_acquire_timeout(Duration::from_secs(1));
    (Pool::new(factory, config).unwrap(), entered, proceed)
}

#[test]
fn acquire_fails_when_shutdown_overtakes_create() {
    let (pool, entered, proceed) = gated_pool(1);
    pool.factory().hold_create.store(true, Ordering::SeqCst);

    let acquirer = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().map(|handle| *handle))
    };
    entered.recv().unwrap();

    pool.shutdown();
    proceed.send(()).unwrap();

    assert!(matches!(acquirer.join().unwrap(), Err(PoolError::PoolClosed)));
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
}

#[test]
fn release_racing_shutdown_leaves_nothing_idle() {
    let (pool, entered, proceed) = gated_pool(2);
    let handle = pool.acquire().unwrap();
    pool.factory().hold_reset.store(true, Ordering::SeqCst);

    let releaser = thread::spawn(move || handle.release());
    entered.recv().unwrap();

    pool.shutdown();
    proceed.send(()).unwrap();
    releaser.join().unwrap();

    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
}

#[test]
fn handle_held_across_shutdown_is_closed_on_drop() {
    let pool = pool_with(2, Duration::from_millis(100));
    let held = pool.acquire().unwrap();
    let idle = pool.acquire().unwrap();
    idle.release();

    pool.shutdown();

    assert_eq!(pool.in_use_count(), 1);
    assert_eq!(pool.free_count(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![1]);
    assert!(matches!(pool.acquire(), Err(PoolError::PoolClosed)));

    drop(held);

    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![1, 0]);
}

#[test]
fn try_acquire_replaces_unhealthy_idle_resource() {
    let pool = pool_with(1, Duration::from_millis(100));
    pool.acquire().unwrap().release();
    pool.factory().broken.lock().insert(0);

    let fresh = pool.try_acquire().expect("evicting the idle resource frees its slot");
    assert_eq!(fresh.serial, 1);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
    assert_eq!(pool.size(), 1);
}

#[test]
fn unhealthy_resource_is_dropped_on_return() {
    let config = PoolConfiguration::new()
        .with_name("test")
        .with_max_pool_size(2)
        .with_validate_on_return(true);
    let pool = Pool::new(Backend::default(), config).unwrap();

    let handle = pool.acquire().unwrap();
    pool.factory().broken.lock().insert(handle.serial);
    handle.release();

    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
    assert_eq!(pool.get_metrics().validation_failures, 1);
}

#[test]
fn idle_resource_retires_after_idle_timeout() {
    let config = PoolConfiguration::new()
        .with_name("test")
        .with_max_pool_size(1)
        .with_idle_timeout(Duration::from_millis(10))
        .with_warmup(1);
    let pool = Pool::new(Backend::default(), config).unwrap();
    assert_eq!(pool.free_count(), 1);

    thread::sleep(Duration::from_millis(30));

    let handle = pool.acquire().unwrap();
    assert_eq!(handle.serial, 1);
    assert_eq!(*pool.factory().closed.lock(), vec![0]);
    assert_consistent(&pool);
}

#[test]
fn warmup_size_prepopulates_on_construction() {
    let config = PoolConfiguration::new()
        .with_name("test")
        .with_max_pool_size(4)
        .with_warmup(3);
    let pool = Pool::new(Backend::default(), config).unwrap();

    assert_eq!(pool.free_count(), 3);
    assert_eq!(pool.size(), 3);
    assert_eq!(pool.get_metrics().total_created, 3);
}

#[test]
fn failed_warmup_closes_what_it_created() {
    let backend = Backend {
        refuse_after: Some(1),
        ..Backend::default()
    };
    let closed = Arc::clone(&backend.closed);
    let config = PoolConfiguration::new()
        .with_name("test")
        .with_max_pool_size(4)
        .with_warmup(3);

    match Pool::new(backend, config) {
        Err(PoolError::Factory(_)) => {}
        Err(other) => panic!("expected factory error, got {other:?}"),
        Ok(_) => panic!("expected factory error, got a pool"),
    }
    assert_eq!(*closed.lock(), vec![0]);
}
