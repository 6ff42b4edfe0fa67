//! Injectable wall clock
//!
//! Soft-delete stamps and cache TTL arithmetic read time through a `Clock`
//! injected at construction rather than calling `Utc::now()` inline, so
//! tests control the passage of time.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::identity::Timestamp;

/// Source of wall time for timestamps and TTL checks.
pub trait Clock: Send + Sync {
    /// Current wall time.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock frozen at the given instant.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Utc::now());
        let before = clock.now();
        clock.advance(Duration::from_secs(600));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(600));
    }

    #[test]
    fn test_manual_clock_is_frozen_between_advances() {
        let clock = ManualClock::new(Utc::now());
        assert_eq!(clock.now(), clock.now());
    }
}
