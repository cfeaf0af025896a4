//! Time source for the review manager. Production code reads the wall clock; tests and
//! the `--today` flag pin it.
use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone};
use std::sync::Mutex;

pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Pins the clock to local noon of `day`. `None` only if noon does not exist there.
    pub fn at_noon(day: NaiveDate) -> Option<Self> {
        let noon = day.and_hms_opt(12, 0, 0)?;
        Local.from_local_datetime(&noon).earliest().map(Self::new)
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Moves the clock forward by whole days (for simulating spaced repetition).
    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += TimeDelta::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
