//! Calendar-day aggregation backed by a persistent per-day cache.
//!
//! Past days are computed once and stored; later queries read them back and
//! only compute the days still missing, a few at a time. The current day is
//! always computed fresh and never stored.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};

use super::error::{EngineError, EngineResult};
use super::stepped::{compute_buckets, StepOptions};
use crate::db::repository::{CachedDay, DayCacheRepository, HistoryRepository};
use crate::models::{
    Bucket, BucketSumMode, Field, LocalCalendar, QueryRange, Step, SteppedAggregate, Window,
};

/// Days computed at once when none is configured.
pub const DEFAULT_BACKFILL_CONCURRENCY: usize = 4;

/// Inserts tried per computed day when the cache store is unreachable.
const PERSIST_ATTEMPTS: usize = 2;

/// Settings of the day-cache orchestration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayCacheOptions {
    pub calendar: LocalCalendar,
    pub concurrency: usize,
    pub sum_mode: BucketSumMode,
}

impl DayCacheOptions {
    pub fn new(calendar: LocalCalendar) -> Self {
        Self {
            calendar,
            concurrency: DEFAULT_BACKFILL_CONCURRENCY,
            sum_mode: BucketSumMode::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_sum_mode(mut self, sum_mode: BucketSumMode) -> Self {
        self.sum_mode = sum_mode;
        self
    }
}

/// Local midnights of the days overlapping `window`, up to and including
/// `today`.
pub fn days_in(window: &Window, today: DateTime<Utc>, calendar: &LocalCalendar) -> Vec<DateTime<Utc>> {
    if window.end <= window.start {
        return Vec::new();
    }
    let first = calendar.day_start(window.start);
    let last = calendar
        .day_start(window.end - TimeDelta::milliseconds(1))
        .min(today);

    let mut days = Vec::new();
    let mut day = first;
    while day <= last {
        days.push(day);
        day = calendar.next_day_start(day);
    }
    days
}

fn empty_day(start: DateTime<Utc>, end: DateTime<Utc>) -> Bucket {
    Bucket {
        start_date: Some(start),
        end_date: Some(end),
        sum: Some(0.0),
        total_ms: Some(0),
        count: Some(0),
        count_changes: Some(0),
        ..Default::default()
    }
}

/// Cached buckets of the past days in `days`, keyed by day start.
///
/// A failing cache read degrades to recomputing every day.
async fn read_cached<R>(
    repo: &R,
    device_key: &str,
    days: &[DateTime<Utc>],
    today: DateTime<Utc>,
) -> BTreeMap<DateTime<Utc>, Bucket>
where
    R: DayCacheRepository + ?Sized,
{
    let (Some(first), Some(last_past)) = (days.first(), days.iter().rev().find(|d| **d < today))
    else {
        return BTreeMap::new();
    };

    match repo.read_days(device_key, *first, *last_past).await {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| e.day_start < today)
            .map(|e| (e.day_start, e.bucket))
            .collect(),
        Err(e) => {
            warn!("Day cache read failed for '{}', recomputing: {}", device_key, e);
            BTreeMap::new()
        }
    }
}

async fn persist<R>(repo: &R, day: &CachedDay)
where
    R: DayCacheRepository + ?Sized,
{
    let when = day.day_start.to_rfc3339();
    for attempt in 1..=PERSIST_ATTEMPTS {
        match repo.insert_day(day).await {
            Ok(()) => debug!("Cached day {} for '{}'", when, day.device_key),
            Err(e) if e.is_duplicate_key() => {
                debug!("Day {} for '{}' was already cached", when, day.device_key)
            }
            Err(e) if e.is_retryable() && attempt < PERSIST_ATTEMPTS => {
                debug!(
                    "Caching day {} for '{}' failed (attempt {}), retrying: {}",
                    when, day.device_key, attempt, e
                );
                continue;
            }
            Err(e) => warn!("Failed to cache day {} for '{}': {}", when, day.device_key, e),
        }
        return;
    }
}

/// Compute one day and store it unless it is the current day.
async fn backfill_day<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
    day: DateTime<Utc>,
    today: DateTime<Utc>,
    now: DateTime<Utc>,
    options: DayCacheOptions,
) -> EngineResult<(Bucket, Option<String>)>
where
    R: HistoryRepository + DayCacheRepository + ?Sized,
{
    let next = options.calendar.next_day_start(day);
    let is_today = day >= today;
    let end = if is_today { now.clamp(day, next) } else { next };

    let day_range = range.restricted_to(Window::new(day, end));
    let step = StepOptions::new(Step::Day, options.calendar).with_sum_mode(options.sum_mode);
    let (bucket, units) = match compute_buckets(repo, device_key, &day_range, end, step).await? {
        Some(agg) => {
            let bucket = agg
                .buckets
                .into_iter()
                .next()
                .unwrap_or_else(|| empty_day(day, next));
            (bucket, agg.units)
        }
        None => (empty_day(day, next), None),
    };

    if !is_today {
        persist(repo, &CachedDay::new(device_key, day, bucket.clone())).await;
    }
    Ok((bucket, units))
}

/// One bucket per local calendar day of `window` that has samples.
///
/// Days after today are ignored. Past days come from the cache when present
/// and are computed and cached otherwise; today is always computed over
/// `[midnight, now)`. A history source error aborts the whole query; cache
/// failures are only logged.
pub async fn aggregate_by_day<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
    window: Window,
    now: DateTime<Utc>,
    options: DayCacheOptions,
) -> EngineResult<SteppedAggregate>
where
    R: HistoryRepository + DayCacheRepository + ?Sized,
{
    let calendar = options.calendar;
    let today = calendar.day_start(now);
    let days = days_in(&window, today, &calendar);
    if days.is_empty() {
        return Ok(SteppedAggregate::default());
    }

    let mut cached = read_cached(repo, device_key, &days, today).await;
    let mut slots: Vec<Option<Bucket>> = Vec::with_capacity(days.len());
    let mut missing = Vec::new();
    for (index, day) in days.iter().enumerate() {
        match cached.remove(day) {
            Some(bucket) => slots.push(Some(bucket)),
            None => {
                slots.push(None);
                missing.push((index, *day));
            }
        }
    }
    debug!(
        "Day aggregation for '{}': {} day(s), {} cached, {} to compute",
        device_key,
        days.len(),
        days.len() - missing.len(),
        missing.len()
    );

    let computed: Vec<(usize, Bucket, Option<String>)> = stream::iter(missing)
        .map(|(index, day)| async move {
            let (bucket, units) =
                backfill_day(repo, device_key, range, day, today, now, options).await?;
            Ok::<_, EngineError>((index, bucket, units))
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    let mut units = None;
    for (index, bucket, day_units) in computed {
        slots[index] = Some(bucket);
        units = units.or(day_units);
    }

    let projection = &range.projection;
    let buckets = slots
        .into_iter()
        .flatten()
        .filter(|b| !b.is_empty())
        .map(|b| b.project(projection))
        .collect();

    Ok(SteppedAggregate {
        units: range
            .output_units
            .clone()
            .or(units)
            .filter(|_| projection.includes(Field::Units)),
        buckets,
    })
}

#[cfg(test)]
#[path = "day_cache_tests.rs"]
mod day_cache_tests;
