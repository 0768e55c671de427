//! Time source and calendar-day arithmetic.
//!
//! # Responsibility
//! - Provide an injectable wall clock so workflow and sweep behavior can be
//!   exercised at arbitrary instants.
//! - Map epoch-millisecond instants onto calendar days in a fixed UTC offset.
//!
//! # Invariants
//! - A calendar day is the half-open range `[start_ms, start_ms + 1 day)`.
//! - Day indexes are contiguous integers; `plus_days(1)` is the next day.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Wall-clock source in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the operating system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// `num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// One calendar day in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    date: NaiveDate,
    offset: FixedOffset,
}

impl CalendarDay {
    /// Day containing `instant_ms` as observed in `offset`.
    pub fn containing(instant_ms: i64, offset: FixedOffset) -> Self {
        let instant = DateTime::from_timestamp_millis(instant_ms).unwrap_or(if instant_ms < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            date: instant.with_timezone(&offset).date_naive(),
            offset,
        }
    }

    /// Days since 1970-01-01 in local time; stable key for per-day dedup.
    pub fn index(&self) -> i64 {
        i64::from(self.date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn plus_days(&self, days: i64) -> Self {
        let shifted = if days >= 0 {
            self.date.checked_add_days(Days::new(days.unsigned_abs()))
        } else {
            self.date.checked_sub_days(Days::new(days.unsigned_abs()))
        };
        Self {
            date: shifted.unwrap_or(if days >= 0 {
                NaiveDate::MAX
            } else {
                NaiveDate::MIN
            }),
            offset: self.offset,
        }
    }

    /// First instant of the day, epoch ms.
    pub fn start_ms(&self) -> i64 {
        let local_midnight = self.date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        local_midnight - i64::from(self.offset.local_minus_utc()) * 1000
    }

    /// First instant of the following day, epoch ms.
    pub fn end_ms(&self) -> i64 {
        self.plus_days(1).start_ms()
    }
}

/// Renders an instant as `YYYY-MM-DD` in `offset` for alert messages.
pub fn format_local_date(instant_ms: i64, offset: FixedOffset) -> String {
    match DateTime::from_timestamp_millis(instant_ms) {
        Some(instant) => instant.with_timezone(&offset).format("%Y-%m-%d").to_string(),
        None => instant_ms.to_string(),
    }
}
