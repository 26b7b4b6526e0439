//! Background detection of resources that were checked out and never returned

use crate::factory::ResourceFactory;
use crate::handle::HandleId;
use crate::metrics::MetricsTracker;
use crate::pool::PoolInner;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A resource that has been held longer than the configured leak threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakWarning {
    pub handle: HandleId,
    pub held: Duration,
}

/// Entries from an in-use snapshot that have been held for at least `threshold`
pub(crate) fn find_leaks<I>(entries: I, threshold: Duration, now: Instant) -> Vec<LeakWarning>
where
    I: IntoIterator<Item = (HandleId, Instant)>,
{
    entries
        .into_iter()
        .filter_map(|(handle, since)| {
            let held = now.saturating_duration_since(since);
            (held >= threshold).then_some(LeakWarning { handle, held })
        })
        .collect()
}

/// Periodic scanner over a pool's in-use set.
///
/// Only reports; it never touches the resources it finds.
pub(crate) struct LeakMonitor {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LeakMonitor {
    pub fn spawn<F: ResourceFactory>(
        pool: Weak<PoolInner<F>>,
        threshold: Duration,
        interval: Duration,
        events: Sender<LeakWarning>,
        name: &str,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name(format!("{name}-leak-monitor"))
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let Some(pool) = pool.upgrade() else { break };
                    if pool.is_closed() {
                        break;
                    }

                    let snapshot = pool.in_use_entries();
                    for leak in find_leaks(snapshot, threshold, Instant::now()) {
                        warn!(
                            pool = %pool.config.name,
                            handle = %leak.handle,
                            held_ms = leak.held.as_millis() as u64,
                            "Possible leaked resource"
                        );
                        MetricsTracker::incr(&pool.metrics.leak_warnings);
                        // Nobody listening or a full channel must not stall the scan
                        let _ = events.try_send(leak);
                    }
                }
                debug!("Leak monitor stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Signal the monitor and wait for it to finish its current tick
    pub fn stop(mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            // The last pool reference can be released from the monitor thread itself
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }

    /// Signal the monitor without waiting for it
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
    }
}

impl Drop for LeakMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}
