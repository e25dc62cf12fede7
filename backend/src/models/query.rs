//! Query parameters shared by every read operation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Scan direction over a device's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(format!("Unknown order: {}", s)),
        }
    }
}

/// Bucket width for stepped aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Fixed width in milliseconds (always > 0).
    Fixed(i64),
    /// Local-midnight aligned calendar days.
    Day,
}

impl Step {
    /// Fixed step, `None` for a non-positive width.
    pub fn fixed_millis(millis: i64) -> Option<Self> {
        (millis > 0).then_some(Self::Fixed(millis))
    }

    /// Default step when a stepped query names none: a tenth of the window,
    /// at least one millisecond.
    pub fn default_for(window: &Window) -> Self {
        Self::Fixed((window.span_millis() / 10).max(1))
    }
}

impl FromStr for Step {
    type Err = String;

    /// Parse `"day"` or a positive number of milliseconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("day") {
            return Ok(Self::Day);
        }
        let millis: i64 = trimmed
            .parse()
            .map_err(|_| format!("Invalid step '{}': expected milliseconds or \"day\"", s))?;
        Self::fixed_millis(millis).ok_or_else(|| format!("Step must be positive, got {}", millis))
    }
}

/// Output fields that can be requested through a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Min,
    Max,
    MinRate,
    MaxRate,
    Average,
    Integral,
    Sum,
    Count,
    CountChanges,
    TotalMs,
    Delta,
    StartDate,
    EndDate,
    Units,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Min,
        Field::Max,
        Field::MinRate,
        Field::MaxRate,
        Field::Average,
        Field::Integral,
        Field::Sum,
        Field::Count,
        Field::CountChanges,
        Field::TotalMs,
        Field::Delta,
        Field::StartDate,
        Field::EndDate,
        Field::Units,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Min => "min",
            Field::Max => "max",
            Field::MinRate => "minRate",
            Field::MaxRate => "maxRate",
            Field::Average => "average",
            Field::Integral => "integral",
            Field::Sum => "sum",
            Field::Count => "count",
            Field::CountChanges => "countChanges",
            Field::TotalMs => "totalMs",
            Field::Delta => "delta",
            Field::StartDate => "startDate",
            Field::EndDate => "endDate",
            Field::Units => "units",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(field) = Field::ALL
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(trimmed))
        {
            return Ok(*field);
        }
        // Names used by older clients.
        match trimmed {
            "minDT" => Ok(Field::MinRate),
            "maxDT" => Ok(Field::MaxRate),
            "sumDT" => Ok(Field::Integral),
            "diffMinMax" => Ok(Field::Delta),
            _ => Err(format!("Unknown field: {}", s)),
        }
    }
}

/// Set of requested output fields. The default projection includes every
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Projection(Option<BTreeSet<Field>>);

impl Projection {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn only(fields: impl IntoIterator<Item = Field>) -> Self {
        Self(Some(fields.into_iter().collect()))
    }

    pub fn includes(&self, field: Field) -> bool {
        match &self.0 {
            None => true,
            Some(fields) => fields.contains(&field),
        }
    }

    /// True when any of `fields` is requested.
    pub fn includes_any(&self, fields: &[Field]) -> bool {
        fields.iter().any(|f| self.includes(*f))
    }

    pub fn is_all(&self) -> bool {
        self.0.is_none()
    }
}

impl FromStr for Projection {
    type Err = String;

    /// Parse a comma-separated field list. An empty string selects all
    /// fields.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return Ok(Self::all());
        }
        let fields = names
            .into_iter()
            .map(Field::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self(Some(fields)))
    }
}

/// Closed-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn span_millis(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Range parameters of a read query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRange {
    pub date_min: Option<DateTime<Utc>>,
    pub date_max: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub order: Order,
    pub output_units: Option<String>,
    #[serde(default)]
    pub projection: Projection,
}

impl QueryRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(date_min: DateTime<Utc>, date_max: DateTime<Utc>) -> Self {
        Self {
            date_min: Some(date_min),
            date_max: Some(date_max),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_output_units(mut self, units: impl Into<String>) -> Self {
        self.output_units = Some(units.into());
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Check `date_min <= date_max` when both are given.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.date_min, self.date_max) {
            if min > max {
                return Err(format!(
                    "dateMin ({}) is after dateMax ({})",
                    min.to_rfc3339(),
                    max.to_rfc3339()
                ));
            }
        }
        if self.limit == Some(0) {
            return Err("limit must be positive".to_string());
        }
        Ok(())
    }

    /// Concrete window: missing bounds default to `[end - default_span, now)`.
    ///
    /// Fails when the defaulted start falls outside chrono's range.
    pub fn window(&self, now: DateTime<Utc>, default_span: TimeDelta) -> Result<Window, String> {
        let end = self.date_max.unwrap_or(now);
        let start = match self.date_min {
            Some(start) => start,
            None => end.checked_sub_signed(default_span).ok_or_else(|| {
                format!(
                    "window of {}h before {} is out of range",
                    default_span.num_hours(),
                    end.to_rfc3339()
                )
            })?,
        };
        Ok(Window::new(start, end))
    }

    /// Range used by aggregations: ascending, and bounded by the default
    /// window unless the caller capped the scan with a limit.
    pub fn for_aggregation(
        &self,
        now: DateTime<Utc>,
        default_span: TimeDelta,
    ) -> Result<QueryRange, String> {
        let mut range = self.clone();
        range.order = Order::Ascending;
        if range.limit.is_none() {
            let window = self.window(now, default_span)?;
            range.date_min = Some(window.start);
            range.date_max = Some(window.end);
        }
        Ok(range)
    }

    /// Same range restricted to `window`, ascending, without a limit.
    pub fn restricted_to(&self, window: Window) -> QueryRange {
        QueryRange {
            date_min: Some(window.start),
            date_max: Some(window.end),
            limit: None,
            order: Order::Ascending,
            output_units: self.output_units.clone(),
            projection: self.projection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_defaults_to_span_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let window = QueryRange::new().window(now, TimeDelta::hours(24)).unwrap();
        assert_eq!(window.end, now);
        assert_eq!(window.span_millis(), 86_400_000);
    }

    #[test]
    fn test_window_start_out_of_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let span = TimeDelta::days(100_000_000);
        assert!(QueryRange::new().window(now, span).is_err());
        assert!(QueryRange::new().for_aggregation(now, span).is_err());

        // A limited scan keeps its open bounds.
        let limited = QueryRange::new().with_limit(3).for_aggregation(now, span).unwrap();
        assert_eq!(limited.date_min, None);
    }
}
