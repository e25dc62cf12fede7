//! Whole-window statistics in a single ascending pass.
//!
//! The signal is treated as a zero-order hold: each sample's value is held
//! until the next sample, and the last one until the end of the window.

use chrono::{DateTime, Utc};

use super::error::{EngineError, EngineResult};
use super::units::UnitsTracker;
use crate::db::repository::{FoldVisitor, HistoryRepository};
use crate::models::time::millis_between;
use crate::models::{Field, Projection, QueryRange, RatePoint, Sample, SamplePoint, Stats};

/// Accumulator of the full-range aggregation.
#[derive(Debug)]
pub struct FullRangeFold {
    device_key: String,
    projection: Projection,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    track_rates: bool,
    track_area: bool,
    units: UnitsTracker,

    first: Option<DateTime<Utc>>,
    prev: Option<Sample>,
    min: Option<SamplePoint>,
    max: Option<SamplePoint>,
    min_rate: Option<RatePoint>,
    max_rate: Option<RatePoint>,
    sum: f64,
    count: usize,
    total_ms: i64,
    area: f64,
}

impl FullRangeFold {
    /// Fold over `range`, holding the last value until `end`.
    pub fn new(device_key: &str, range: &QueryRange, end: DateTime<Utc>) -> Self {
        let projection = range.projection.clone();
        Self {
            device_key: device_key.to_string(),
            track_rates: projection.includes_any(&[Field::MinRate, Field::MaxRate]),
            track_area: projection.includes_any(&[Field::Average, Field::Integral, Field::TotalMs]),
            projection,
            start: range.date_min,
            end,
            units: UnitsTracker::new(range.output_units.as_deref()),
            first: None,
            prev: None,
            min: None,
            max: None,
            min_rate: None,
            max_rate: None,
            sum: 0.0,
            count: 0,
            total_ms: 0,
            area: 0.0,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.units.observe(sample.units.as_deref());

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

        if let Some(prev) = &self.prev {
            let dt = millis_between(prev.timestamp, sample.timestamp);
            let held = prev.value.numeric();
            if self.track_rates && dt != 0 {
                let rate = RatePoint {
                    value: held / dt as f64,
                    timestamp: sample.timestamp,
                };
                if self.min_rate.map_or(true, |r| rate.value < r.value) {
                    self.min_rate = Some(rate);
                }
                if self.max_rate.map_or(true, |r| rate.value > r.value) {
                    self.max_rate = Some(rate);
                }
            }
            if self.track_area {
                self.total_ms += dt;
                self.area += held * dt as f64;
            }
        }

        self.sum += sample.value.numeric();
        self.count += 1;
        self.first.get_or_insert(sample.timestamp);
        self.prev = Some(sample);
    }

    /// Extend the last held value to the end of the window.
    pub fn finish(&mut self) {
        if !self.track_area {
            return;
        }
        if let Some(prev) = &self.prev {
            let tail = millis_between(prev.timestamp, self.end).max(0);
            self.total_ms += tail;
            self.area += prev.value.numeric() * tail as f64;
        }
    }

    /// Projected statistics, `None` when no sample was seen.
    pub fn into_stats(self) -> Option<Stats> {
        if self.count == 0 {
            return None;
        }
        self.units.report(&self.device_key);

        let keep = |field: Field| self.projection.includes(field);
        let average = (self.total_ms > 0).then(|| self.area / self.total_ms as f64);
        let delta = match (&self.min, &self.max) {
            (Some(min), Some(max)) => Some(max.value.numeric() - min.value.numeric()),
            _ => None,
        };

        Some(Stats {
            min: self.min.clone().filter(|_| keep(Field::Min)),
            max: self.max.clone().filter(|_| keep(Field::Max)),
            min_rate: self.min_rate.filter(|_| keep(Field::MinRate)),
            max_rate: self.max_rate.filter(|_| keep(Field::MaxRate)),
            average: average.filter(|_| keep(Field::Average)),
            integral: Some(self.area).filter(|_| self.track_area && keep(Field::Integral)),
            sum: Some(self.sum).filter(|_| keep(Field::Sum)),
            count: Some(self.count).filter(|_| keep(Field::Count)),
            total_ms: Some(self.total_ms).filter(|_| self.track_area && keep(Field::TotalMs)),
            delta: delta.filter(|_| keep(Field::Delta)),
            start_date: self.start.or(self.first).filter(|_| keep(Field::StartDate)),
            end_date: Some(self.end).filter(|_| keep(Field::EndDate)),
            units: self.units.units().filter(|_| keep(Field::Units)),
        })
    }
}

/// Whole-window statistics of `device_key` over `range`.
///
/// `range` is expected in ascending order; `end` is where the last value
/// stops being held (the window end, or now when the range is open).
pub async fn aggregate<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
    end: DateTime<Utc>,
) -> EngineResult<Option<Stats>>
where
    R: HistoryRepository + ?Sized,
{
    let mut visitor = FoldVisitor::new(
        FullRangeFold::new(device_key, range, end),
        FullRangeFold::push,
        FullRangeFold::finish,
    );
    repo.fetch(device_key, range, &mut visitor)
        .await
        .map_err(|e| EngineError::from_repository(device_key, e))?;
    Ok(visitor.into_inner().into_stats())
}

#[cfg(test)]
#[path = "full_range_tests.rs"]
mod full_range_tests;
