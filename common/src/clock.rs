//! Wall-clock abstraction so timestamps can be controlled in tests.

use std::ops::Add;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Milliseconds since the Unix epoch. Times before the epoch clamp to 0.
    fn now_ms(&self) -> i64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl MockClock {
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// A clock starting `ms` milliseconds after the epoch.
    pub fn at_ms(ms: u64) -> Self {
        Self::with_time(UNIX_EPOCH + Duration::from_millis(ms))
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = now.add(duration);
    }

    pub fn set_time(&self, time: SystemTime) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_millis_since_epoch() {
        // given
        let clock = MockClock::at_ms(1_500);

        // when
        clock.advance(Duration::from_millis(250));

        // then
        assert_eq!(clock.now_ms(), 1_750);
    }

    #[test]
    fn should_clamp_pre_epoch_times_to_zero() {
        // given
        let clock = MockClock::at_ms(0);

        // when
        clock.set_time(UNIX_EPOCH - Duration::from_secs(5));

        // then
        assert_eq!(clock.now_ms(), 0);
    }
}
