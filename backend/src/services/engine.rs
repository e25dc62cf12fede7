//! Query façade over a history store.
//!
//! [`HistoryEngine`] owns the store handle, the clock, the calendar and the
//! last-value cache, and exposes the read operations (last value, raw
//! history, aggregates, counters) plus message ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::cumulative::accumulate;
use super::day_cache::{aggregate_by_day, DayCacheOptions};
use super::error::{EngineError, EngineResult};
use super::full_range;
use super::ingest::{self, SensorMessage};
use super::last_value::{get_last, LastValueCache};
use super::stepped::{aggregate_by_step, check_step, StepOptions};
use crate::config::{EngineConfig, EngineSettings};
use crate::db::repository::{FullRepository, HistoryRepository, SampleCollector};
use crate::models::{
    Aggregate, Clock, CumulativeResult, LastValueEntry, LocalCalendar, QueryRange, Sample, Step,
    SystemClock, Window,
};

/// Last values of several devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastValues {
    pub entries: BTreeMap<String, LastValueEntry>,
    /// Most recent timestamp across `entries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Entry point of the history operations.
#[derive(Clone)]
pub struct HistoryEngine {
    repo: Arc<dyn FullRepository>,
    clock: Arc<dyn Clock>,
    calendar: LocalCalendar,
    settings: EngineSettings,
    aliases: BTreeMap<String, String>,
    last_values: Arc<LastValueCache>,
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("calendar", &self.calendar)
            .field("settings", &self.settings)
            .field("cached_last_values", &self.last_values.len())
            .finish()
    }
}

impl HistoryEngine {
    /// Engine with default settings, the wall clock and the host calendar.
    pub fn new(repo: Arc<dyn FullRepository>) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
            calendar: LocalCalendar::system(),
            settings: EngineSettings::default(),
            aliases: BTreeMap::new(),
            last_values: Arc::new(LastValueCache::new()),
        }
    }

    /// Engine configured from a loaded [`EngineConfig`].
    pub fn from_config(repo: Arc<dyn FullRepository>, config: &EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let engine = Self {
            calendar: config.calendar()?,
            settings: config.engine.clone(),
            aliases: config.ingest.device_aliases.clone(),
            ..Self::new(repo)
        };
        info!(
            "History engine ready (backfill concurrency {}, window {}h, sum mode {:?})",
            engine.settings.backfill_concurrency,
            engine.settings.default_window_hours,
            engine.settings.bucket_sum_mode
        );
        Ok(engine)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_calendar(mut self, calendar: LocalCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repo
    }

    pub fn last_value_cache(&self) -> &LastValueCache {
        &self.last_values
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn default_window(&self) -> EngineResult<TimeDelta> {
        self.settings.default_window().ok_or_else(|| {
            EngineError::invalid_query(format!(
                "default window of {}h is out of range",
                self.settings.default_window_hours
            ))
        })
    }

    fn window(&self, range: &QueryRange, now: DateTime<Utc>) -> EngineResult<Window> {
        range
            .window(now, self.default_window()?)
            .map_err(EngineError::InvalidQuery)
    }

    fn aggregation_range(&self, range: &QueryRange, now: DateTime<Utc>) -> EngineResult<QueryRange> {
        range
            .for_aggregation(now, self.default_window()?)
            .map_err(EngineError::InvalidQuery)
    }

    pub async fn health_check(&self) -> EngineResult<bool> {
        Ok(self.repo.health_check().await?)
    }

    pub async fn list_devices(&self) -> EngineResult<Vec<String>> {
        Ok(self.repo.list_devices().await?)
    }

    /// Most recent reading of a device, `None` if it never reported one.
    pub async fn get_last_value(&self, device_key: &str) -> EngineResult<Option<LastValueEntry>> {
        get_last(self.repo.as_ref(), &self.last_values, device_key).await
    }

    /// Last values of `device_keys`, looked up a few at a time.
    ///
    /// Unknown devices and devices without readings are left out.
    pub async fn get_last_values(&self, device_keys: &[String]) -> EngineResult<LastValues> {
        let found: Vec<Option<LastValueEntry>> = stream::iter(device_keys)
            .map(|key| async move {
                match self.get_last_value(key).await {
                    Err(EngineError::NotFound { .. }) => Ok(None),
                    other => other,
                }
            })
            .buffer_unordered(self.settings.batch_concurrency.max(1))
            .try_collect()
            .await?;

        let entries: BTreeMap<String, LastValueEntry> = found
            .into_iter()
            .flatten()
            .map(|entry| (entry.device_key.clone(), entry))
            .collect();
        let last_modified = entries.values().map(|e| e.timestamp).max();
        Ok(LastValues {
            entries,
            last_modified,
        })
    }

    /// Raw samples of a device.
    ///
    /// Without a limit, missing bounds fall back to the default window
    /// ending now.
    pub async fn get_history(&self, device_key: &str, range: &QueryRange) -> EngineResult<Vec<Sample>> {
        range.validate().map_err(EngineError::InvalidQuery)?;
        let mut scan = range.clone();
        if scan.limit.is_none() {
            let window = self.window(range, self.now())?;
            scan.date_min = Some(window.start);
            scan.date_max = Some(window.end);
        }

        let mut collector = SampleCollector::new();
        self.repo
            .fetch(device_key, &scan, &mut collector)
            .await
            .map_err(|e| EngineError::from_repository(device_key, e))?;
        let samples = collector.into_samples();
        debug!("History of '{}': {} sample(s)", device_key, samples.len());
        Ok(samples)
    }

    /// Statistics of a device over a range.
    ///
    /// Without a step the whole range is folded into one summary; a fixed
    /// step yields buckets of that width; [`Step::Day`] yields calendar-day
    /// buckets served through the day cache. `None` when the range holds no
    /// sample.
    pub async fn get_aggregate(
        &self,
        device_key: &str,
        range: &QueryRange,
        step: Option<Step>,
    ) -> EngineResult<Option<Aggregate>> {
        range.validate().map_err(EngineError::InvalidQuery)?;
        let now = self.now();
        let window = self.window(range, now)?;
        let scan = self.aggregation_range(range, now)?;
        if let Some(step) = step {
            let bounded = scan.date_min.is_some() && scan.date_max.is_some();
            check_step(step, &window, bounded)?;
        }
        let end = scan.date_max.unwrap_or(now);
        let repo = self.repo.as_ref();

        let aggregate = match step {
            None => full_range::aggregate(repo, device_key, &scan, end)
                .await?
                .map(Aggregate::Full),
            Some(Step::Day) => {
                let options = DayCacheOptions::new(self.calendar)
                    .with_concurrency(self.settings.backfill_concurrency)
                    .with_sum_mode(self.settings.bucket_sum_mode);
                let daily = aggregate_by_day(repo, device_key, &scan, window, now, options).await?;
                Some(daily)
                    .filter(|agg| !agg.buckets.is_empty())
                    .map(Aggregate::Daily)
            }
            Some(step) => {
                let options = StepOptions::new(step, self.calendar)
                    .with_sum_mode(self.settings.bucket_sum_mode);
                aggregate_by_step(repo, device_key, &scan, end, options)
                    .await?
                    .map(Aggregate::Stepped)
            }
        };
        Ok(aggregate)
    }

    /// Bucketed statistics with a fixed step, or a tenth of the window when
    /// `step` is `None`.
    pub async fn get_stepped(
        &self,
        device_key: &str,
        range: &QueryRange,
        step: Option<i64>,
    ) -> EngineResult<Option<Aggregate>> {
        let step = match step {
            Some(ms) => Step::Fixed(ms),
            None => Step::default_for(&self.window(range, self.now())?),
        };
        self.get_aggregate(device_key, range, Some(step)).await
    }

    /// Counter total of a device over a range, restarting on resets.
    pub async fn get_cumulative(
        &self,
        device_key: &str,
        range: &QueryRange,
    ) -> EngineResult<CumulativeResult> {
        range.validate().map_err(EngineError::InvalidQuery)?;
        let scan = self.aggregation_range(range, self.now())?;
        accumulate(self.repo.as_ref(), device_key, &scan).await
    }

    /// Store the reading carried by `message`.
    pub async fn save(&self, message: &SensorMessage) -> EngineResult<Option<(String, Sample)>> {
        ingest::save(self.repo.as_ref(), &self.last_values, &self.aliases, message).await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
