//! Aggregation results.
//!
//! Every output field is optional so that a projection can drop what the
//! caller did not ask for; `None` fields are omitted when serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::{Field, Projection};
use super::sample::SamplePoint;

/// Extreme of the held-value-to-elapsed-time ratio between two consecutive
/// samples, stamped with the later sample's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Whole-window statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<SamplePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<SamplePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rate: Option<RatePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate: Option<RatePoint>,
    /// Zero-order-hold time-weighted mean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Area under the held signal (value x ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral: Option<f64>,
    /// Plain sum of sample values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// One time slice of a stepped aggregation. `end_date` is exclusive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<SamplePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<SamplePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_changes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl Bucket {
    /// `max - min` when both extremes are known.
    pub fn min_max_delta(&self) -> Option<f64> {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => Some(max.value.numeric() - min.value.numeric()),
            _ => None,
        }
    }

    /// True when no sample contributed to this bucket.
    pub fn is_empty(&self) -> bool {
        self.count.unwrap_or(0) == 0 && self.min.is_none()
    }

    /// Copy keeping only the projected fields. `delta` is derived from the
    /// full bucket before extremes are dropped.
    pub fn project(&self, projection: &Projection) -> Bucket {
        let keep = |field: Field| projection.includes(field);
        Bucket {
            start_date: self.start_date.filter(|_| keep(Field::StartDate)),
            end_date: self.end_date.filter(|_| keep(Field::EndDate)),
            min: self.min.clone().filter(|_| keep(Field::Min)),
            max: self.max.clone().filter(|_| keep(Field::Max)),
            sum: self.sum.filter(|_| keep(Field::Sum)),
            average: self.average.filter(|_| keep(Field::Average)),
            total_ms: self.total_ms.filter(|_| keep(Field::TotalMs)),
            count: self.count.filter(|_| keep(Field::Count)),
            count_changes: self.count_changes.filter(|_| keep(Field::CountChanges)),
            delta: self
                .delta
                .or_else(|| self.min_max_delta())
                .filter(|_| keep(Field::Delta)),
        }
    }
}

/// How a transition crossing bucket boundaries feeds the buckets' `sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketSumMode {
    /// Each bucket receives the held value scaled by its share of the
    /// elapsed time, while transitions inside a bucket add the raw value.
    #[default]
    Apportioned,
    /// The bucket of the later sample receives the raw held value, as for
    /// transitions inside a bucket.
    Attributed,
}

impl std::str::FromStr for BucketSumMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apportioned" => Ok(Self::Apportioned),
            "attributed" => Ok(Self::Attributed),
            _ => Err(format!("Unknown bucket sum mode: {}", s)),
        }
    }
}

/// Buckets of a stepped or day-cached aggregation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteppedAggregate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    pub buckets: Vec<Bucket>,
}

/// Result of `get_aggregate`, shaped by the requested step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Aggregate {
    Full(Stats),
    Stepped(SteppedAggregate),
    Daily(SteppedAggregate),
}

/// Reconstructed counter total over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeResult {
    pub device_key: String,
    pub current: f64,
    pub count: usize,
    pub count_changes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}
