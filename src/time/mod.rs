//! Clock abstraction for time-based cache behavior
//!
//! Age-based trimming and manifest timestamps go through the [`Clock`] trait
//! so tests can control time progression without actual delays.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source used by both cache tiers
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get seconds since UNIX epoch
    fn unix_seconds(&self) -> i64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Allows tests to advance time without actual delays, enabling fast and
/// reliable testing of age-limit behavior.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            base: SystemTime::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by whole seconds (convenience method)
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    fn offset(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.offset()
    }

    fn system_time(&self) -> SystemTime {
        self.base + self.offset()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for time.
    use super::*;

    /// Validates `SystemClock` behavior for the unix seconds scenario.
    ///
    /// Assertions:
    /// - Ensures `SystemClock.unix_seconds() > 1_500_000_000` evaluates to
    ///   true.
    #[test]
    fn test_system_clock_unix_seconds() {
        assert!(SystemClock.unix_seconds() > 1_500_000_000);
    }

    /// Validates `MockClock::advance` behavior for the monotonic advance
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `clock.now() - start` equals `Duration::from_secs(10)`.
    /// - Confirms `clock.unix_seconds() - base` equals `10`.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();
        let base = clock.unix_seconds();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now() - start, Duration::from_secs(10));
        assert_eq!(clock.unix_seconds() - base, 10);
    }

    /// Validates `MockClock::clone` behavior for the shared elapsed scenario.
    ///
    /// Assertions:
    /// - Confirms `clone.now()` equals `clock.now()` after advancing the
    ///   original.
    #[test]
    fn test_mock_clock_clone_shares_time() {
        let clock = MockClock::new();
        let clone = clock.clone();

        clock.advance_secs(5);

        assert_eq!(clone.now(), clock.now());
    }
}
