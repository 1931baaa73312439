//! Process-wide clock. All scheduling is done in naive local time.

use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime, Timelike};

use super::traits::Clock;

/// Wall clock in the process's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Settable clock for deterministic runs and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Drop seconds and below; reminders are minute-precision.
pub fn minute_floor(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(56));
        assert_eq!(clock.now(), start + Duration::minutes(56));
    }

    #[test]
    fn minute_floor_truncates_seconds() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_milli_opt(8, 15, 42, 500)
            .unwrap();
        assert_eq!(
            minute_floor(ts),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(8, 15, 0).unwrap()
        );
    }
}
