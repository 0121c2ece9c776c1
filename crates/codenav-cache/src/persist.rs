//! Background cache writer with debouncing.
//!
//! Writes are scheduled under a key; rescheduling the same key replaces the
//! pending job and restarts its debounce window. A worker thread scans the
//! pending map and executes jobs whose window has elapsed, keeping
//! serialization and disk I/O off the request path entirely.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type WriteJob = Box<dyn FnOnce() -> io::Result<()> + Send>;

struct PendingWrite {
    job: WriteJob,
    scheduled_at: Instant,
}

struct Shared {
    pending: Mutex<HashMap<String, PendingWrite>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    flush_requested: AtomicBool,
    debounce: Duration,
}

/// Background cache writer with debouncing.
///
/// In disabled mode every scheduled write executes synchronously on the
/// calling thread, which keeps the call sites identical in both modes.
pub struct AsyncCachePersister {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    enabled: bool,
}

/// How often the worker rescans pending writes.
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

impl AsyncCachePersister {
    /// Create a persister. `debounce` is the minimum hold time per key;
    /// `enabled = false` switches to synchronous writes.
    pub fn new(debounce: Duration, enabled: bool) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            debounce,
        });

        let worker = if enabled {
            let shared_for_worker = Arc::clone(&shared);
            Some(
                thread::Builder::new()
                    .name("cache-persister".to_string())
                    .spawn(move || worker_loop(&shared_for_worker))
                    .unwrap_or_else(|e| {
                        // Thread spawn only fails under resource exhaustion;
                        // surfacing it as a panic here would tear down the
                        // caller, so log and run without a worker (writes
                        // will execute on flush).
                        warn!(error = %e, "failed to spawn cache persister worker");
                        thread::spawn(|| {})
                    }),
            )
        } else {
            None
        };

        debug!(?debounce, enabled, "cache persister initialized");
        Self { shared, worker: Mutex::new(worker), enabled }
    }

    /// Schedule a write under `key`, replacing any pending write for the
    /// same key and restarting its debounce window.
    pub fn schedule_write(
        &self,
        key: impl Into<String>,
        job: impl FnOnce() -> io::Result<()> + Send + 'static,
    ) {
        let key = key.into();
        if !self.enabled {
            if let Err(e) = job() {
                warn!(key = %key, error = %e, "synchronous cache write failed");
            }
            return;
        }

        let mut pending = self.shared.pending.lock();
        pending.insert(key.clone(), PendingWrite { job: Box::new(job), scheduled_at: Instant::now() });
        drop(pending);
        self.shared.wakeup.notify_all();
        debug!(key = %key, "cache write scheduled");
    }

    /// Number of writes waiting to execute.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Whether writes run on the background worker.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Force all pending writes to execute now and wait for completion.
    ///
    /// Returns `false` when the timeout elapsed with writes still pending.
    pub fn flush_all(&self, timeout: Duration) -> bool {
        if !self.enabled {
            return true;
        }

        self.shared.flush_requested.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();

        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.pending.lock().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                let remaining = self.pending_count();
                warn!(remaining, "cache flush timeout");
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Flush pending writes, then stop and join the worker.
    pub fn shutdown(&self, timeout: Duration) {
        if !self.enabled {
            return;
        }

        self.flush_all(timeout / 2);
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            // The worker re-checks the shutdown flag at least every scan
            // interval, so this join is bounded in practice.
            if handle.join().is_err() {
                warn!("cache persister worker panicked");
            }
        }
        debug!("cache persister shut down");
    }
}

impl Drop for AsyncCachePersister {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(5));
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        {
            let mut pending = shared.pending.lock();
            if !shared.shutdown.load(Ordering::SeqCst)
                && !shared.flush_requested.load(Ordering::SeqCst)
            {
                shared.wakeup.wait_for(&mut pending, SCAN_INTERVAL);
            }
        }

        let force = shared.flush_requested.swap(false, Ordering::SeqCst)
            || shared.shutdown.load(Ordering::SeqCst);
        execute_due_writes(shared, force);

        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
}

/// Execute writes whose debounce window elapsed (or all, when forced).
/// Jobs run outside the pending lock so schedulers never block on I/O.
fn execute_due_writes(shared: &Shared, force: bool) {
    let due: Vec<(String, WriteJob)> = {
        let mut pending = shared.pending.lock();
        let keys: Vec<String> = pending
            .iter()
            .filter(|(_, w)| force || w.scheduled_at.elapsed() >= shared.debounce)
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| pending.remove(&k).map(|w| (k, w.job)))
            .collect()
    };

    for (key, job) in due {
        match job() {
            Ok(()) => debug!(key = %key, "async cache write completed"),
            Err(e) => warn!(key = %key, error = %e, "async cache write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn disabled_mode_writes_synchronously() {
        let persister = AsyncCachePersister::new(Duration::from_secs(60), false);
        let executed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        persister.schedule_write("k", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(executed.load(Ordering::SeqCst));
        assert_eq!(persister.pending_count(), 0);
    }

    #[test]
    fn debounce_holds_writes_until_flush() {
        let persister = AsyncCachePersister::new(Duration::from_secs(60), true);
        let executed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        persister.schedule_write("k", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        // Still debounced
        thread::sleep(Duration::from_millis(50));
        assert!(!executed.load(Ordering::SeqCst));
        assert_eq!(persister.pending_count(), 1);

        assert!(persister.flush_all(Duration::from_secs(5)));
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn rescheduling_replaces_the_pending_job() {
        let persister = AsyncCachePersister::new(Duration::from_secs(60), true);
        let counter = Arc::new(AtomicUsize::new(0));

        for add in [1usize, 10, 100] {
            let counter = Arc::clone(&counter);
            persister.schedule_write("same-key", move || {
                counter.fetch_add(add, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(persister.pending_count(), 1);

        assert!(persister.flush_all(Duration::from_secs(5)));
        // Only the last job ran.
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn short_debounce_executes_without_flush() {
        let persister = AsyncCachePersister::new(Duration::from_millis(10), true);
        let executed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        persister.schedule_write("k", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !executed.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_write_is_dropped_not_retried() {
        let persister = AsyncCachePersister::new(Duration::from_millis(1), true);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        persister.schedule_write("k", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::other("disk full"))
        });

        assert!(persister.flush_all(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(persister.pending_count(), 0);
    }

    #[test]
    fn shutdown_flushes_pending_writes() {
        let persister = AsyncCachePersister::new(Duration::from_secs(60), true);
        let executed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        persister.schedule_write("k", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        persister.shutdown(Duration::from_secs(5));
        assert!(executed.load(Ordering::SeqCst));
    }
}
