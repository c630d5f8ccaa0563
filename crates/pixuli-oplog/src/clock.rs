//! Time abstraction for testability

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, TimeZone, Utc};

/// Source of "now" for record timestamps and the daily statistics window
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }

    /// Local midnight of the current day, in milliseconds since the epoch
    fn today_start_millis(&self) -> i64 {
        local_midnight_millis(self.now_utc())
    }
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Start the clock at `millis` since the epoch
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward (or backward, for negative values)
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Local midnight of the day containing `now`
pub fn local_midnight_millis(now: DateTime<Utc>) -> i64 {
    let midnight = now.with_timezone(&Local).date_naive().and_hms_opt(0, 0, 0);

    // DST transitions can make local midnight ambiguous or skipped
    midnight
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_utc().timestamp_millis(), 42);
    }

    #[test]
    fn test_local_midnight_is_within_last_day() {
        let now = Utc::now();
        let midnight = local_midnight_millis(now);
        let now_millis = now.timestamp_millis();

        assert!(midnight <= now_millis);
        // Allow for a 25-hour day across a DST shift
        assert!(now_millis - midnight < 25 * 60 * 60 * 1000);
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now().timestamp_millis();
        let now = SystemClock.now_millis();
        let after = Utc::now().timestamp_millis();
        assert!(before <= now && now <= after);
    }
}
