//! Counter reconstruction over a possibly resetting odometer series.

use chrono::{DateTime, Utc};

use super::error::{EngineError, EngineResult};
use super::units::UnitsTracker;
use crate::db::repository::{FoldVisitor, HistoryRepository};
use crate::models::{CumulativeResult, QueryRange, Sample};

/// Accumulator of the counter reconstruction.
///
/// A decrease is read as a counter reset: the segment restarts from the new
/// value and no negative delta is added.
#[derive(Debug)]
pub struct CounterFold {
    device_key: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    units: UnitsTracker,
    prev: Option<f64>,
    total: f64,
    count: usize,
    count_changes: usize,
}

impl CounterFold {
    pub fn new(device_key: &str, range: &QueryRange) -> Self {
        Self {
            device_key: device_key.to_string(),
            start: range.date_min,
            end: range.date_max,
            units: UnitsTracker::new(range.output_units.as_deref()),
            prev: None,
            total: 0.0,
            count: 0,
            count_changes: 0,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.units.observe(sample.units.as_deref());
        let value = sample.value.numeric();
        self.count += 1;
        match self.prev {
            None => self.count_changes += 1,
            Some(prev) if value < prev => self.count_changes += 1,
            Some(prev) => self.total += value - prev,
        }
        self.prev = Some(value);
    }

    pub fn finish(&mut self) {
        self.units.report(&self.device_key);
    }

    pub fn into_result(self) -> CumulativeResult {
        CumulativeResult {
            units: self.units.units(),
            device_key: self.device_key,
            current: self.total,
            count: self.count,
            count_changes: self.count_changes,
            start_date: self.start,
            end_date: self.end,
        }
    }
}

/// Reconstructed counter total of `device_key` over `range`.
///
/// An empty range yields a zeroed result.
pub async fn accumulate<R>(
    repo: &R,
    device_key: &str,
    range: &QueryRange,
) -> EngineResult<CumulativeResult>
where
    R: HistoryRepository + ?Sized,
{
    let mut visitor = FoldVisitor::new(
        CounterFold::new(device_key, range),
        CounterFold::push,
        CounterFold::finish,
    );
    repo.fetch(device_key, range, &mut visitor)
        .await
        .map_err(|e| EngineError::from_repository(device_key, e))?;
    Ok(visitor.into_inner().into_result())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::db::repositories::LocalRepository;

    fn counter(values: &[f64]) -> CumulativeResult {
        let range = QueryRange::new();
        let mut fold = CounterFold::new("odo", &range);
        let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        for (i, v) in values.iter().enumerate() {
            fold.push(Sample::new(*v, t0 + TimeDelta::seconds(i as i64)));
        }
        fold.finish();
        fold.into_result()
    }

    #[test]
    fn test_monotonic_counter() {
        let result = counter(&[5.0, 8.0, 9.0]);
        assert_eq!(result.current, 4.0);
        assert_eq!(result.count, 3);
        assert_eq!(result.count_changes, 1);
    }

    #[test]
    fn test_counter_reset() {
        let result = counter(&[5.0, 8.0, 6.0, 9.0]);
        assert_eq!(result.current, 6.0);
        assert_eq!(result.count, 4);
        assert_eq!(result.count_changes, 2);
    }

    #[test]
    fn test_flat_counter_adds_nothing() {
        let result = counter(&[3.0, 3.0, 3.0]);
        assert_eq!(result.current, 0.0);
        assert_eq!(result.count_changes, 1);
    }

    #[tokio::test]
    async fn test_empty_range_is_zeroed() {
        let repo = LocalRepository::new();
        repo.register_device("odo@kwh");
        let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let range = QueryRange::between(t0, t0 + TimeDelta::days(1));

        let result = accumulate(&repo, "odo@kwh", &range).await.unwrap();
        assert_eq!(result.current, 0.0);
        assert_eq!(result.count, 0);
        assert_eq!(result.count_changes, 0);
        assert_eq!(result.start_date, Some(t0));
        assert_eq!(result.device_key, "odo@kwh");
    }

    #[tokio::test]
    async fn test_units_reported() {
        let repo = LocalRepository::new();
        let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        repo.seed_samples(
            "odo@kwh",
            vec![
                Sample::new(10.0, t0).with_units("kWh"),
                Sample::new(12.5, t0 + TimeDelta::hours(1)).with_units("kWh"),
            ],
        );

        let result = accumulate(&repo, "odo@kwh", &QueryRange::new()).await.unwrap();
        assert_eq!(result.current, 2.5);
        assert_eq!(result.units.as_deref(), Some("kWh"));
    }
}
