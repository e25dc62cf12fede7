//! Bucketed downsampling with zero-order-hold interpolation.
//!
//! The window is cut into contiguous buckets of a fixed width or of one local
//! calendar day. Each transition between two consecutive samples is charged
//! to the buckets it spans: inside a single bucket the transition is charged
//! whole, across boundaries the held value is split by time overlap. Buckets
//! are created lazily as the scan reaches them, but every bucket between the
//! first and the last touched one is materialized.

use chrono::{DateTime, TimeDelta, Utc};

use super::error::{EngineError, EngineResult};
use super::units::UnitsTracker;
use crate::db::repository::{FoldVisitor, HistoryRepository};
use crate::models::time::millis_between;
use crate::models::{
    Bucket, BucketSumMode, Field, LocalCalendar, Projection, QueryRange, Sample, SamplePoint,
    SampleValue, Step, SteppedAggregate, Window,
};

/// Most buckets a single query may produce.
pub const MAX_BUCKETS: usize = 100_000;

const DAY_MILLIS: i64 = 86_400_000;

/// Reject a step that cannot slice `window`: a non-positive width, a first
/// bucket ending past the last representable instant, or more than
/// [`MAX_BUCKETS`] buckets when `bounded`.
pub fn check_step(step: Step, window: &Window, bounded: bool) -> EngineResult<()> {
    let width = match step {
        Step::Fixed(width) if width <= 0 => {
            return Err(EngineError::invalid_query(format!(
                "step must be positive, got {}",
                width
            )));
        }
        Step::Fixed(width) => width,
        Step::Day => DAY_MILLIS,
    };
    if TimeDelta::try_milliseconds(width)
        .and_then(|w| window.start.checked_add_signed(w))
        .is_none()
    {
        return Err(EngineError::invalid_query(format!(
            "step of {} ms is out of range",
            width
        )));
    }
    if bounded {
        let buckets = window.span_millis().max(0) / width + 1;
        if buckets > MAX_BUCKETS as i64 {
            return Err(EngineError::invalid_query(format!(
                "step of {} ms cuts the window into {} buckets (at most {})",
                width, buckets, MAX_BUCKETS
            )));
        }
    }
    Ok(())
}

/// How a stepped aggregation slices time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOptions {
    pub step: Step,
    pub calendar: LocalCalendar,
    pub sum_mode: BucketSumMode,
}

impl StepOptions {
    pub fn new(step: Step, calendar: LocalCalendar) -> Self {
        Self {
            step,
            calendar,
            sum_mode: BucketSumMode::default(),
        }
    }

    pub fn with_sum_mode(mut self, sum_mode: BucketSumMode) -> Self {
        self.sum_mode = sum_mode;
        self
    }
}

/// Bucket boundaries anchored at an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketGrid {
    origin: DateTime<Utc>,
    step: Step,
    calendar: LocalCalendar,
}

impl BucketGrid {
    /// Grid whose bucket 0 contains `origin`. Calendar-day grids start at the
    /// local midnight of that day.
    pub fn new(origin: DateTime<Utc>, step: Step, calendar: LocalCalendar) -> Self {
        let origin = match step {
            Step::Fixed(_) => origin,
            Step::Day => calendar.day_start(origin),
        };
        Self {
            origin,
            step,
            calendar,
        }
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    /// Index of the bucket containing `t`; instants before the origin map
    /// to bucket 0.
    pub fn index_of(&self, t: DateTime<Utc>) -> usize {
        let index = match self.step {
            Step::Fixed(width) => millis_between(self.origin, t).div_euclid(width.max(1)),
            Step::Day => self.calendar.days_between(self.origin, t),
        };
        usize::try_from(index).unwrap_or(0)
    }

    /// Start of bucket `index`, saturating at the last representable instant.
    pub fn start_of(&self, index: usize) -> DateTime<Utc> {
        match self.step {
            Step::Fixed(width) => i64::try_from(index)
                .ok()
                .and_then(|i| width.checked_mul(i))
                .and_then(TimeDelta::try_milliseconds)
                .and_then(|offset| self.origin.checked_add_signed(offset))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Step::Day => self.calendar.nth_day_start(self.origin, index as u64),
        }
    }

    /// Exclusive end of bucket `index`.
    pub fn end_of(&self, index: usize) -> DateTime<Utc> {
        self.start_of(index + 1)
    }
}

#[derive(Debug, Clone, Default)]
struct BucketState {
    min: Option<SamplePoint>,
    max: Option<SamplePoint>,
    sum: f64,
    total_ms: i64,
    weighted: f64,
    count: usize,
    count_changes: usize,
}

impl BucketState {
    fn observe(&mut self, sample: &Sample) {
        if self
            .min
            .as_ref()
            .map_or(true, |m| sample.value.is_less_than(&m.value))
        {
            self.min = Some(sample.point());
        }
        if self
            .max
            .as_ref()
            .map_or(true, |m| sample.value.is_greater_than(&m.value))
        {
            self.max = Some(sample.point());
        }
    }

    fn close_transition(&mut self, changed: bool) {
        self.count += 1;
        if changed {
            self.count_changes += 1;
        }
    }
}

/// Accumulator of the stepped aggregation.
#[derive(Debug)]
pub struct SteppedFold {
    device_key: String,
    options: StepOptions,
    grid: Option<BucketGrid>,
    end: DateTime<Utc>,
    units: UnitsTracker,

    buckets: Vec<BucketState>,
    current: usize,
    prev: Option<Sample>,
    samples: usize,
    too_many_buckets: bool,
}

impl SteppedFold {
    /// Fold over `range`. Buckets start at `range.date_min`, or at the first
    /// sample when the range is open; the last value is held until `end`.
    pub fn new(
        device_key: &str,
        range: &QueryRange,
        end: DateTime<Utc>,
        options: StepOptions,
    ) -> Self {
        Self {
            device_key: device_key.to_string(),
            grid: range
                .date_min
                .map(|origin| BucketGrid::new(origin, options.step, options.calendar)),
            options,
            end,
            units: UnitsTracker::new(range.output_units.as_deref()),
            buckets: Vec::new(),
            current: 0,
            prev: None,
            samples: 0,
            too_many_buckets: false,
        }
    }

    fn grid(&mut self, first: DateTime<Utc>) -> BucketGrid {
        let options = self.options;
        *self
            .grid
            .get_or_insert_with(|| BucketGrid::new(first, options.step, options.calendar))
    }

    /// Make buckets up to `index` exist; false once past [`MAX_BUCKETS`].
    fn materialize(&mut self, index: usize) -> bool {
        if index >= MAX_BUCKETS {
            self.too_many_buckets = true;
            return false;
        }
        if self.buckets.len() <= index {
            self.buckets.resize_with(index + 1, BucketState::default);
        }
        true
    }

    /// True when the samples spread over more than [`MAX_BUCKETS`] buckets;
    /// the fold stopped there.
    pub fn exceeded_bucket_limit(&self) -> bool {
        self.too_many_buckets
    }

    pub fn push(&mut self, sample: Sample) {
        if self.too_many_buckets {
            return;
        }
        self.units.observe(sample.units.as_deref());
        let grid = self.grid(sample.timestamp);
        let index = grid.index_of(sample.timestamp).max(self.current);

        if !self.materialize(index) {
            return;
        }
        self.buckets[index].observe(&sample);
        self.transition(&grid, index, sample.timestamp, Some(&sample.value));

        self.samples += 1;
        self.prev = Some(sample);
    }

    /// Close the last held interval at the end of the window.
    pub fn finish(&mut self) {
        if self.too_many_buckets {
            return;
        }
        let Some(prev_ts) = self.prev.as_ref().map(|p| p.timestamp) else {
            return;
        };
        let grid = self.grid(prev_ts);
        let target = self.end.max(prev_ts);
        // An exclusive end on a boundary belongs to the bucket before it.
        let index = grid
            .index_of(target - TimeDelta::milliseconds(1))
            .max(self.current);

        if self.materialize(index) {
            self.transition(&grid, index, target, None);
        }
    }

    /// Charge the interval from the predecessor to (`index`, `t`).
    fn transition(
        &mut self,
        grid: &BucketGrid,
        index: usize,
        t: DateTime<Utc>,
        cur: Option<&SampleValue>,
    ) {
        let Some(prev) = &self.prev else {
            self.current = index;
            return;
        };
        let prev_ts = prev.timestamp;
        let held = prev.value.numeric();
        let changed = cur.is_some_and(|v| *v != prev.value);
        let dt = millis_between(prev_ts, t);

        if index == self.current {
            let bucket = &mut self.buckets[index];
            bucket.sum += held;
            bucket.total_ms += dt;
            bucket.weighted += held * dt as f64;
            bucket.close_transition(changed);
        } else {
            for k in self.current..=index {
                let lo = grid.start_of(k).max(prev_ts);
                let hi = grid.end_of(k).min(t);
                let overlap = millis_between(lo, hi).max(0);
                let bucket = &mut self.buckets[k];
                match self.options.sum_mode {
                    BucketSumMode::Apportioned if dt > 0 => {
                        bucket.sum += held * overlap as f64 / dt as f64;
                    }
                    BucketSumMode::Apportioned => {}
                    BucketSumMode::Attributed if k == index => bucket.sum += held,
                    BucketSumMode::Attributed => {}
                }
                bucket.total_ms += overlap;
                bucket.weighted += held * overlap as f64;
            }
            self.buckets[index].close_transition(changed);
        }
        self.current = index;
    }

    /// Every materialized bucket with all fields, `None` when no sample was
    /// seen.
    pub fn into_aggregate(self) -> Option<SteppedAggregate> {
        if self.samples == 0 {
            return None;
        }
        let grid = self.grid?;
        self.units.report(&self.device_key);

        let buckets = self
            .buckets
            .into_iter()
            .enumerate()
            .map(|(i, state)| Bucket {
                start_date: Some(grid.start_of(i)),
                end_date: Some(grid.end_of(i)),
                min: state.min,
                max: state.max,
                sum: Some(state.sum),
                average: (state.total_ms > 0).then(|| state.weighted / state.total_ms as f64),
                total_ms: Some(state.total_ms),
                count: Some(state.count),
                count_changes: Some(state.count_changes),
                delta: None,
            })
            .collect();

        Some(SteppedAggregate {
            units: self.units.units(),
            buckets,
        })
    }
}

/// Keep only the projected fields of a stepped result.
pub fn project(aggregate: SteppedAggregate, projection: &Projection) -> SteppedAggregate {
    SteppedAggregate {
        units: aggregate.units.filter(|_| projection.includes(Field::Units)),
        buckets: aggregate
            .buckets
            .iter()
            .map(|b| b.project(projection))
            .collect(),
    }
}

/// Unprojected buckets of `device_key` over `range`.
pub(crate) async fn compute_buckets<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
    end: DateTime<Utc>,
    options: StepOptions,
) -> EngineResult<Option<SteppedAggregate>>
where
    R: HistoryRepository + ?Sized,
{
    let mut visitor = FoldVisitor::new(
        SteppedFold::new(device_key, range, end, options),
        SteppedFold::push,
        SteppedFold::finish,
    );
    repo.fetch(device_key, range, &mut visitor)
        .await
        .map_err(|e| EngineError::from_repository(device_key, e))?;
    let fold = visitor.into_inner();
    if fold.exceeded_bucket_limit() {
        return Err(EngineError::invalid_query(format!(
            "'{}' spans more than {} buckets, use a wider step",
            device_key, MAX_BUCKETS
        )));
    }
    Ok(fold.into_aggregate())
}

/// Bucketed statistics of `device_key` over `range`, projected.
///
/// `range` is expected in ascending order; `end` is where the last value
/// stops being held. Returns `None` when the range holds no sample.
pub async fn aggregate_by_step<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
    end: DateTime<Utc>,
    options: StepOptions,
) -> EngineResult<Option<SteppedAggregate>>
where
    R: HistoryRepository + ?Sized,
{
    let buckets = compute_buckets(repo, device_key, range, end, options).await?;
    Ok(buckets.map(|agg| project(agg, &range.projection)))
}

#[cfg(test)]
#[path = "stepped_tests.rs"]
mod stepped_tests;
