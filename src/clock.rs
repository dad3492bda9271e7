//! Monotonic time source and request-trace identifiers.
//!
//! Cache ages are measured against a monotonic clock rather than wall time so that a system
//! clock step (NTP slew, leap second) can never make an entry appear to age backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonic milliseconds since the clock was created.
///
/// Abstracted behind a trait so cache-age tests can drive time deterministically instead of
/// sleeping in real time.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds elapsed since this clock was constructed.
    fn now_ms(&self) -> u64;
}

/// Wall-clock-backed implementation used in production.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// A clock whose value is set explicitly by the test, for TTL/age assertions that must not
/// depend on wall-clock timing.
#[derive(Debug, Default)]
pub struct FakeClock {
    millis: AtomicU64,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self { millis: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, value_ms: u64) {
        self.millis.store(value_ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

static TRACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A short, process-unique trace id for correlating a single client request across log lines.
/// Not used for anything semantic (caching, coalescing) — purely an observability aid.
pub fn next_trace_id() -> String {
    let n = TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{n:x}")
}
