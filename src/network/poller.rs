//! Poll pacing: exponential backoff and the single-flight busy flag.

use super::BASE_POLL_INTERVAL;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry interval that doubles on every consecutive failure and drops back
/// to the base interval after the first success
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    current: Duration,
    failures: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_POLL_INTERVAL)
    }
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            current: base,
            failures: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Double the interval and return the new value
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(2);
        tracing::warn!(
            failures = self.failures,
            retry_secs = self.current.as_secs(),
            "poll failed, backing off"
        );
        self.current
    }

    /// Back to the base interval; true if the interval changed
    pub fn on_success(&mut self) -> bool {
        let changed = self.current != self.base;
        self.current = self.base;
        self.failures = 0;
        changed
    }
}

/// Cooperative single-flight flag. A second poll attempt while one is in
/// flight is skipped, not queued.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

/// Clears the flag when dropped
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `None` if a poll is already in flight
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
