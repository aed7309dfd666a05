//! Deterministic clock abstraction for date-dependent license rules.

use chrono::{Local, NaiveDate};

/// Clock trait for deterministic dates in tests.
///
/// License rules compare calendar dates only, so the clock hands out a
/// date rather than an instant. It is consulted on every call and never
/// cached.
pub trait Clock: Send + Sync {
    /// Today's calendar date.
    fn today(&self) -> NaiveDate;
}

/// System clock using the local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Mock clock for deterministic testing.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug, Clone)]
pub struct MockClock {
    today: NaiveDate,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given date.
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Create a mock clock from a `YYYY-MM-DD` string.
    pub fn from_ymd(s: &str) -> Self {
        Self {
            today: NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid YYYY-MM-DD date"),
        }
    }

    /// Advance the clock by a number of days.
    pub fn advance_days(&mut self, days: i64) {
        self.today += chrono::Duration::days(days);
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}
