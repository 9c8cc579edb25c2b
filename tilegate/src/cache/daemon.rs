//! Background daemons: shared memory size enforcement and periodic
//! stats logging.
//!
//! Each daemon runs on its own named thread, sleeps in short
//! sub-intervals so shutdown stays responsive, and is joined when
//! dropped so the process shuts down in an orderly way.

use crate::cache::memory::SharedMemoryCache;
use crate::cache::stats::CacheStats;
use crate::log::Logger;
use crate::{log_debug, log_info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on how long a daemon sleeps before re-checking shutdown.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Background task draining the shared memory store's write history.
///
/// Wakes every `interval` and calls
/// [`SharedMemoryCache::enforce_size`]. Writes themselves never evict,
/// so between ticks the store may transiently overshoot its ceiling by
/// the burst volume; the daemon brings it back under.
pub struct EnforcementDaemon {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl EnforcementDaemon {
    /// Start the enforcement thread.
    pub fn start(store: Arc<SharedMemoryCache>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let thread_handle = thread::Builder::new()
            .name("shared-memory-enforce".to_string())
            .spawn(move || {
                Self::run_loop(store, interval, shutdown_flag);
            })
            .expect("failed to spawn shared memory enforcement thread");

        Self {
            thread_handle: Some(thread_handle),
            shutdown,
        }
    }

    fn run_loop(store: Arc<SharedMemoryCache>, interval: Duration, shutdown: Arc<AtomicBool>) {
        let check_interval = interval.min(SHUTDOWN_CHECK_INTERVAL);
        let mut elapsed = Duration::ZERO;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            thread::sleep(check_interval);
            elapsed += check_interval;

            if elapsed >= interval {
                elapsed = Duration::ZERO;
                store.enforce_size();
            }
        }
    }

    /// Signal the daemon to stop. Non-blocking; the thread exits at its
    /// next shutdown check.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the daemon thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the daemon thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for EnforcementDaemon {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

/// Background task logging a cache's serving statistics.
pub struct StatsLogDaemon {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl StatsLogDaemon {
    /// Start the stats logging thread.
    ///
    /// `log_prefix` identifies the owning cache in each line.
    pub fn start(
        stats: Arc<CacheStats>,
        logger: Arc<dyn Logger>,
        log_prefix: String,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let thread_handle = thread::Builder::new()
            .name("cache-stats".to_string())
            .spawn(move || {
                Self::run_loop(stats, logger, log_prefix, interval, shutdown_flag);
            })
            .expect("failed to spawn cache stats thread");

        Self {
            thread_handle: Some(thread_handle),
            shutdown,
        }
    }

    fn run_loop(
        stats: Arc<CacheStats>,
        logger: Arc<dyn Logger>,
        log_prefix: String,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) {
        let check_interval = interval.min(SHUTDOWN_CHECK_INTERVAL);
        let mut elapsed = Duration::ZERO;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                log_debug!(logger, "{log_prefix}: stats logger received shutdown signal");
                break;
            }

            thread::sleep(check_interval);
            elapsed += check_interval;

            if elapsed >= interval {
                elapsed = Duration::ZERO;
                log_info!(logger, "{log_prefix}: {}", stats.snapshot().summary());
            }
        }
    }

    /// Signal the daemon to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the daemon thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsLogDaemon {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}
