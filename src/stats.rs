//! Ambient, non-functional observability counters.
//!
//! A plain atomics-backed snapshot exposed for operators, with no effect on
//! dispatch semantics and no new store keys.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A point-in-time snapshot returned by [`crate::Engine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub dispatched: u64,
    pub failed: u64,
    pub skipped: u64,
    pub in_flight: usize,
    pub last_poll_size: usize,
    /// Milliseconds since the Unix epoch of the most recent poll, or `None`
    /// if the dispatch loop has not polled yet.
    pub last_poll_at_ms: Option<i64>,
}

/// Internal atomic counters the dispatch loop updates as it runs.
pub struct StatsCounters {
    dispatched: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    in_flight: AtomicUsize,
    last_poll_size: AtomicUsize,
    last_poll_at_ms: AtomicI64,
}

const NEVER_POLLED: i64 = i64::MIN;

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            last_poll_size: AtomicUsize::new(0),
            last_poll_at_ms: AtomicI64::new(NEVER_POLLED),
        }
    }
}

impl StatsCounters {
    pub fn snapshot(&self) -> EngineStats {
        let last_poll_at_ms = match self.last_poll_at_ms.load(Ordering::Relaxed) {
            NEVER_POLLED => None,
            ms => Some(ms),
        };

        EngineStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            last_poll_size: self.last_poll_size.load(Ordering::Relaxed),
            last_poll_at_ms,
        }
    }

    pub fn record_poll(&self, size: usize) {
        self.last_poll_size.store(size, Ordering::Relaxed);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as i64;
        self.last_poll_at_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}
