use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

const SECS_PER_DAY: i64 = 86_400;

/// Source of wall-clock time for day-index evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// UTC day index at the moment of the call.
    fn today(&self) -> i64 {
        day_index(self.now())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock positioned at noon UTC of `day`.
    pub fn at_day(day: i64) -> Self {
        Self::new(start_of_day(day) + Duration::hours(12))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// `floor(unix_seconds / 86400)`.
pub fn day_index(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(SECS_PER_DAY)
}

/// The next UTC midnight strictly after `now`.
pub fn next_rollover(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(day_index(now) + 1)
}

pub fn time_until_rollover(now: DateTime<Utc>) -> std::time::Duration {
    (next_rollover(now) - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

fn start_of_day(day: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(day * SECS_PER_DAY, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
