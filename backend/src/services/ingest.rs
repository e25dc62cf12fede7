//! Turning sensor messages into stored samples.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::last_value::LastValueCache;
use crate::db::repository::IngestRepository;
use crate::models::time::from_millis;
use crate::models::{LastValueEntry, Sample, SampleValue};

/// Schema of the messages carrying sensor readings.
pub const SENSOR_SCHEMA: &str = "sensor.basic";

/// A sensor reading as received from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorMessage {
    /// Message schema; only [`SENSOR_SCHEMA`] messages are stored.
    #[serde(default)]
    pub body_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Arrival time, used when the body carries no date.
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    /// Epoch milliseconds or an RFC 3339 instant.
    #[serde(default)]
    pub date: Option<String>,
}

impl SensorMessage {
    pub fn new(device: impl Into<String>, current: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            body_name: Some(SENSOR_SCHEMA.to_string()),
            source: None,
            received_at,
            device: Some(device.into()),
            device_type: None,
            current: Some(current.into()),
            units: None,
            date: None,
        }
    }

    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

const TRUE_WORDS: [&str; 4] = ["enable", "enabled", "on", "true"];
const FALSE_WORDS: [&str; 4] = ["disable", "disabled", "off", "false"];

fn is_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}

/// Typed value of a raw reading: switch words become booleans, plain
/// decimals become numbers, anything else stays text.
pub fn classify_value(raw: &str) -> SampleValue {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        return SampleValue::Bool(true);
    }
    if FALSE_WORDS.contains(&lower.as_str()) {
        return SampleValue::Bool(false);
    }
    if is_decimal(trimmed) {
        if let Ok(n) = trimmed.parse::<f64>() {
            return SampleValue::Number(n);
        }
    }
    SampleValue::Text(raw.to_string())
}

/// Instant of a reading: epoch milliseconds, an RFC 3339 string, or the
/// arrival time when absent.
pub fn parse_date(raw: Option<&str>, received_at: DateTime<Utc>) -> EngineResult<DateTime<Utc>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(received_at);
    };
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(from_millis)
            .ok_or_else(|| EngineError::InvalidMessage(format!("date out of range: {}", raw)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::InvalidMessage(format!("invalid date '{}': {}", raw, e)))
}

/// Storage key and sample of a message, `None` for messages that carry no
/// reading.
pub fn prepare_sample(
    message: &SensorMessage,
    aliases: &BTreeMap<String, String>,
) -> EngineResult<Option<(String, Sample)>> {
    if message
        .body_name
        .as_deref()
        .is_some_and(|name| name != SENSOR_SCHEMA)
    {
        return Ok(None);
    }
    let (Some(device), Some(current)) = (message.device.as_deref(), message.current.as_deref())
    else {
        return Ok(None);
    };
    let device = aliases.get(device).map_or(device, String::as_str);
    if device.is_empty() {
        return Ok(None);
    }

    let device_key = match message.device_type.as_deref().filter(|t| !t.is_empty()) {
        Some(device_type) => format!("{}@{}", device, device_type),
        None => device.to_string(),
    };

    let value = classify_value(current);
    let timestamp = parse_date(message.date.as_deref(), message.received_at)?;
    // Switch states carry no unit.
    let units = match value {
        SampleValue::Bool(_) => None,
        _ => message.units.clone(),
    };

    Ok(Some((
        device_key,
        Sample {
            value,
            timestamp,
            units,
        },
    )))
}

/// Store a message's reading and feed the last-value cache. Returns the
/// stored key and sample, `None` when the message was ignored.
pub async fn save<R>(
    repo: &R,
    cache: &LastValueCache,
    aliases: &BTreeMap<String, String>,
    message: &SensorMessage,
) -> EngineResult<Option<(String, Sample)>>
where
    R: IngestRepository + ?Sized,
{
    let Some((device_key, sample)) = prepare_sample(message, aliases)? else {
        debug!("Ignoring message without reading: {:?}", message.device);
        return Ok(None);
    };

    repo.insert_sample(&device_key, &sample)
        .await
        .map_err(EngineError::Source)?;
    cache.offer(LastValueEntry::from_sample(&device_key, &sample));
    debug!("Stored {} = {} for '{}'", sample.timestamp.to_rfc3339(), sample.value, device_key);
    Ok(Some((device_key, sample)))
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod ingest_tests;
