//! Wall-clock abstraction
//!
//! Token expiry is an absolute UNIX timestamp, so expiry math needs wall
//! time. Hidden-tab durations need a monotonic clock. Both come from one
//! injectable [`Clock`] so tests can drive them deterministically.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic timestamp for measuring durations.
    fn now(&self) -> Instant;

    /// Current wall-clock time.
    fn system_time(&self) -> SystemTime;

    /// Whole seconds since the UNIX epoch.
    ///
    /// Times before the epoch report as negative seconds.
    #[allow(clippy::cast_possible_wrap)]
    fn unix_seconds(&self) -> i64 {
        match self.system_time().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        }
    }
}

/// Real system clock. Use this in production code.
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct FixedClock(SystemTime);

    impl Clock for FixedClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn system_time(&self) -> SystemTime {
            self.0
        }
    }

    #[test]
    fn test_unix_seconds() {
        let clock = FixedClock(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(clock.unix_seconds(), 1_700_000_000);

        let clock = FixedClock(UNIX_EPOCH - Duration::from_secs(5));
        assert_eq!(clock.unix_seconds(), -5);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.unix_seconds() > 0);
    }
}
