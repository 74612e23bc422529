//! Wall-clock access
//!
//! Retention windows, cooldowns and the rule matcher's time-of-day checks all
//! read the current time through [`TimeSource`] so they can be driven by a
//! [`ManualClock`] in tests and replays.

use chrono::{DateTime, Duration, Local, TimeZone};
use std::sync::RwLock;

/// Source of the current time
pub trait TimeSource: Send + Sync {
    /// Current local time
    fn now(&self) -> DateTime<Local>;

    /// Current time as Unix seconds
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Start at the given Unix timestamp
    pub fn at_secs(secs: i64) -> Self {
        let start = Local
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Local::now);
        Self::new(start)
    }

    pub fn set(&self, now: DateTime<Local>) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += Duration::seconds(secs);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_secs(1_700_000_000);
        assert_eq!(clock.now_secs(), 1_700_000_000);

        clock.advance_secs(90);
        assert_eq!(clock.now_secs(), 1_700_000_090);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let now = SystemClock.now_secs();
        assert!(now > 1_600_000_000);
    }
}
