//! Time helpers: clocks and local-calendar day arithmetic.
//!
//! All instants are carried as `DateTime<Utc>`. Calendar-day boundaries are
//! computed in a configurable zone so that "local midnight" means the same
//! thing for the day cache, calendar-day buckets and the "today" cutoff.

use chrono::{
    DateTime, Days, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Utc,
};
use parking_lot::Mutex;

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, used by tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now = *now + delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Milliseconds elapsed from `from` to `to` (negative when `to` is earlier).
pub fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

/// UTC instant of epoch milliseconds, `None` outside chrono's range.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Zone used to place calendar-day boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarZone {
    /// The host's local zone, DST aware.
    System,
    /// A fixed offset from UTC (days are always 24h long).
    Fixed(FixedOffset),
}

/// Local-midnight arithmetic for day buckets and the day cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    zone: CalendarZone,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self::system()
    }
}

impl LocalCalendar {
    pub fn system() -> Self {
        Self {
            zone: CalendarZone::System,
        }
    }

    pub fn utc() -> Self {
        Self {
            zone: CalendarZone::Fixed(Utc.fix()),
        }
    }

    /// Calendar with a fixed offset, `None` when the offset is out of range
    /// (more than a day either way).
    pub fn fixed_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self {
            zone: CalendarZone::Fixed(offset),
        })
    }

    pub fn zone(&self) -> CalendarZone {
        self.zone
    }

    /// Local calendar date containing `t`.
    pub fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        match self.zone {
            CalendarZone::System => t.with_timezone(&Local).date_naive(),
            CalendarZone::Fixed(offset) => t.with_timezone(&offset).date_naive(),
        }
    }

    /// Instant of local midnight starting `date`.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        match self.zone {
            CalendarZone::System => midnight_in(&Local, date),
            CalendarZone::Fixed(offset) => midnight_in(&offset, date),
        }
    }

    /// Local midnight at or before `t`.
    pub fn day_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.local_date(t))
    }

    /// Local midnight strictly after `t`.
    pub fn next_day_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.nth_day_start(t, 1)
    }

    /// Local midnight `n` calendar days after the day containing `origin`.
    pub fn nth_day_start(&self, origin: DateTime<Utc>, n: u64) -> DateTime<Utc> {
        let date = self.local_date(origin);
        match date.checked_add_days(Days::new(n)) {
            Some(target) => self.midnight(target),
            None => self.day_start(origin) + TimeDelta::days(n as i64),
        }
    }

    /// Number of calendar-day boundaries between the day of `origin` and the
    /// day of `t` (negative when `t` falls on an earlier day).
    pub fn days_between(&self, origin: DateTime<Utc>, t: DateTime<Utc>) -> i64 {
        (self.local_date(t) - self.local_date(origin)).num_days()
    }
}

fn midnight_in<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Midnight skipped by a DST gap: the day starts at the first valid instant.
    tz.from_local_datetime(&(naive + TimeDelta::hours(1)))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod time_tests;
