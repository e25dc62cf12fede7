//! Request-facing helpers for a transport layered on the engine.
//!
//! Query strings are decoded into [`QueryParams`] and converted to the
//! engine's [`QueryRange`]. Device keys travel in URL paths as `device/type`
//! and are stored as `device@type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Order, Projection, QueryRange, Step};
use crate::services::{EngineError, EngineResult};

/// Format of the `Last-Modified` and `If-Modified-Since` headers.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Query-string parameters of the read endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(default, alias = "minDate")]
    pub date_min: Option<DateTime<Utc>>,
    #[serde(default, alias = "maxDate")]
    pub date_max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Milliseconds or `"day"`.
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    /// Comma-separated field names.
    #[serde(default)]
    pub projection: Option<String>,
    #[serde(default)]
    pub output_units: Option<String>,
}

impl QueryParams {
    /// Range described by the parameters, validated.
    pub fn to_range(&self) -> EngineResult<QueryRange> {
        let order = match self.order.as_deref() {
            Some(order) => order.parse::<Order>().map_err(EngineError::InvalidQuery)?,
            None => Order::default(),
        };
        let projection = match self.projection.as_deref() {
            Some(fields) => fields
                .parse::<Projection>()
                .map_err(EngineError::InvalidQuery)?,
            None => Projection::all(),
        };

        let range = QueryRange {
            date_min: self.date_min,
            date_max: self.date_max,
            limit: self.limit,
            order,
            output_units: self.output_units.clone().filter(|u| !u.is_empty()),
            projection,
        };
        range.validate().map_err(EngineError::InvalidQuery)?;
        Ok(range)
    }

    /// Requested bucket width, `None` for a whole-range aggregate.
    pub fn step(&self) -> EngineResult<Option<Step>> {
        self.step
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Step>().map_err(EngineError::InvalidQuery))
            .transpose()
    }
}

/// Stored key of a device addressed as `device/type` in a path. Only the
/// last separator is rewritten.
pub fn device_key_from_path(path: &str) -> String {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((device, device_type)) if !device_type.is_empty() => {
            format!("{}@{}", device, device_type)
        }
        _ => path.to_string(),
    }
}

/// Path form of a stored device key.
pub fn device_key_to_path(device_key: &str) -> String {
    match device_key.rsplit_once('@') {
        Some((device, device_type)) => format!("{}/{}", device, device_type),
        None => device_key.to_string(),
    }
}

/// Value of a `Last-Modified` header.
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format(HTTP_DATE_FORMAT).to_string()
}

/// True when the client copy, stamped `if_modified_since`, matches
/// `last_modified` at one-second resolution.
pub fn is_not_modified(if_modified_since: Option<&str>, last_modified: DateTime<Utc>) -> bool {
    let Some(header) = if_modified_since else {
        return false;
    };
    match DateTime::parse_from_rfc2822(header.trim()) {
        Ok(since) => since.timestamp() == last_modified.timestamp(),
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
