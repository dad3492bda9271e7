//! Throttle for rapid-fire duplicate requests: if the same fingerprint was seen very recently,
//! delay briefly before proceeding to the upstream-miss path, giving a concurrent sibling time
//! to populate the cache first.

use std::collections::HashMap;

use rand::Rng;
use tokio::sync::Mutex;

use crate::clock::Clock;

const DUPLICATE_TRIGGER_MS: u64 = 100;
const MIN_DELAY_MS: u64 = 50;
const RANDOM_EXTRA_MS: u64 = 100;

pub struct DuplicateWindow {
    last_seen: Mutex<HashMap<String, u64>>,
}

impl DuplicateWindow {
    pub fn new() -> Self {
        Self { last_seen: Mutex::new(HashMap::new()) }
    }

    /// If `key` was last seen within [`DUPLICATE_TRIGGER_MS`], sleeps for a jittered delay in
    /// `[MIN_DELAY_MS, MIN_DELAY_MS + RANDOM_EXTRA_MS]` before returning. Always records the
    /// current timestamp as the new "last seen" for `key`, whether or not it slept.
    pub async fn throttle(&self, key: &str, clock: &dyn Clock) {
        let now = clock.now_ms();
        let should_sleep = {
            let mut guard = self.last_seen.lock().await;
            let previous = guard.insert(key.to_string(), now);
            previous.is_some_and(|prev| now.saturating_sub(prev) < DUPLICATE_TRIGGER_MS)
        };

        if should_sleep {
            let extra = rand::thread_rng().gen_range(0..=RANDOM_EXTRA_MS);
            tokio::time::sleep(std::time::Duration::from_millis(MIN_DELAY_MS + extra)).await;
        }
    }

    /// Drops entries older than the trigger horizon; called opportunistically so the map doesn't
    /// grow unbounded under a long-running process with a high-cardinality key space.
    pub async fn prune(&self, clock: &dyn Clock) {
        let now = clock.now_ms();
        let mut guard = self.last_seen.lock().await;
        guard.retain(|_, ts| now.saturating_sub(*ts) < DUPLICATE_TRIGGER_MS);
    }

    pub async fn len(&self) -> usize {
        self.last_seen.lock().await.len()
    }
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[tokio::test]
    async fn first_sighting_never_sleeps() {
        let window = DuplicateWindow::new();
        let clock = FakeClock::new(0);
        let start = std::time::Instant::now();
        window.throttle("k1", &clock).await;
        assert!(start.elapsed().as_millis() < 10);
    }

    #[tokio::test]
    async fn rapid_repeat_within_trigger_window_sleeps() {
        let window = DuplicateWindow::new();
        let clock = FakeClock::new(0);
        window.throttle("k1", &clock).await;
        clock.advance(50); // within DUPLICATE_TRIGGER_MS
        let start = std::time::Instant::now();
        window.throttle("k1", &clock).await;
        assert!(start.elapsed().as_millis() >= MIN_DELAY_MS as u128);
    }

    #[tokio::test]
    async fn repeat_outside_trigger_window_does_not_sleep() {
        let window = DuplicateWindow::new();
        let clock = FakeClock::new(0);
        window.throttle("k1", &clock).await;
        clock.advance(500); // outside DUPLICATE_TRIGGER_MS
        let start = std::time::Instant::now();
        window.throttle("k1", &clock).await;
        assert!(start.elapsed().as_millis() < 10);
    }

    #[tokio::test]
    async fn prune_removes_stale_entries() {
        let window = DuplicateWindow::new();
        let clock = FakeClock::new(0);
        window.throttle("k1", &clock).await;
        clock.advance(1000);
        window.prune(&clock).await;
        assert_eq!(window.len().await, 0);
    }
}
