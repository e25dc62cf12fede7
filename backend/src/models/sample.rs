//! Samples as yielded by a history source.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value carried by a sample.
///
/// Sensors report numbers, switches report booleans and a few devices report
/// free text. Aggregations order values numerically whenever both sides have a
/// numeric reading and fall back to lexical order for two texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Numeric reading of the value, if it has one.
    ///
    /// Booleans read as `1.0`/`0.0`; texts are parsed. Non-finite parses are
    /// rejected.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Number(n) => Some(*n),
            SampleValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SampleValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Value used by sums, averages and rates. Texts without a numeric
    /// reading count as `0.0`.
    pub fn numeric(&self) -> f64 {
        self.as_f64().unwrap_or(0.0)
    }

    /// Ordering used by min/max tracking. `None` when the two values are not
    /// comparable (e.g. a boolean against a non-numeric text).
    pub fn compare(&self, other: &SampleValue) -> Option<Ordering> {
        if let (SampleValue::Text(a), SampleValue::Text(b)) = (self, other) {
            if let (Some(x), Some(y)) = (self.as_f64(), other.as_f64()) {
                return x.partial_cmp(&y);
            }
            return Some(a.cmp(b));
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        }
    }

    pub fn is_less_than(&self, other: &SampleValue) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn is_greater_than(&self, other: &SampleValue) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Bool(b) => write!(f, "{}", b),
            SampleValue::Number(n) => write!(f, "{}", n),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Number(v)
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Number(v as f64)
    }
}

impl From<bool> for SampleValue {
    fn from(v: bool) -> Self {
        SampleValue::Bool(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Text(v.to_string())
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Text(v)
    }
}

/// One timestamped reading of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl Sample {
    pub fn new(value: impl Into<SampleValue>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            timestamp,
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Value and instant only, as reported for min/max extremes.
    pub fn point(&self) -> SamplePoint {
        SamplePoint {
            value: self.value.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// A value at an instant, without units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePoint {
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
}

/// Most recent known reading of a device, as held by the last-value cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastValueEntry {
    pub device_key: String,
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl LastValueEntry {
    pub fn from_sample(device_key: impl Into<String>, sample: &Sample) -> Self {
        Self {
            device_key: device_key.into(),
            value: sample.value.clone(),
            timestamp: sample.timestamp,
            units: sample.units.clone(),
        }
    }
}
