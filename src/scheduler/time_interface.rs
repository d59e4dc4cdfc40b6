use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Local monotonic millisecond counter, the only time base the relay
/// trusts between queries.
pub trait TimeInterface: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the process started, from `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct StdTimeSync {
    start: Instant,
}

impl StdTimeSync {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdTimeSync {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeInterface for StdTimeSync {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-driven counter for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualTime {
    now: AtomicU64,
}

impl ManualTime {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl TimeInterface for ManualTime {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<T: TimeInterface + ?Sized> TimeInterface for std::sync::Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
