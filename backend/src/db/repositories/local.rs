//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. Samples are kept sorted
//! per device, the day cache holds `serde_json` documents keyed by device and
//! day, and a few switches let tests inject failures and latency.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::db::identifiers::IdentifierCache;
use crate::db::repository::*;
use crate::models::{Order, QueryRange, Sample, SampleValue};

/// In-memory local repository.
///
/// Clones share the same storage.
///
/// # Example
/// ```
/// use xpl_history::db::repositories::LocalRepository;
/// use xpl_history::models::Sample;
/// use chrono::Utc;
///
/// let repo = LocalRepository::new();
/// repo.seed_samples("meter@kwh", vec![Sample::new(12.5, Utc::now())]);
/// assert_eq!(repo.sample_count("meter@kwh"), 1);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
    identifiers: Arc<IdentifierCache>,
    counters: Arc<UsageCounters>,
}

struct StoredSample {
    value: SampleValue,
    timestamp: DateTime<Utc>,
    unit: Option<IdentifierId>,
}

struct LocalData {
    identifiers: HashMap<(IdentifierKind, String), IdentifierId>,
    names: HashMap<IdentifierId, String>,
    samples: HashMap<IdentifierId, Vec<StoredSample>>,
    day_cache: BTreeMap<(String, DateTime<Utc>), String>,

    next_identifier_id: i64,

    // Connection health and injected faults
    is_healthy: bool,
    fetch_failure: Option<String>,
    day_cache_writes_fail: bool,
    fetch_delay: Option<Duration>,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            identifiers: HashMap::new(),
            names: HashMap::new(),
            samples: HashMap::new(),
            day_cache: BTreeMap::new(),
            next_identifier_id: 1,
            is_healthy: true,
            fetch_failure: None,
            day_cache_writes_fail: false,
            fetch_delay: None,
        }
    }
}

impl LocalData {
    fn device_id(&self, device_key: &str) -> Option<IdentifierId> {
        self.identifiers
            .get(&(IdentifierKind::Device, device_key.to_string()))
            .copied()
    }

    fn intern(&mut self, kind: IdentifierKind, name: &str) -> IdentifierId {
        if let Some(id) = self.identifiers.get(&(kind, name.to_string())) {
            return *id;
        }
        let id = IdentifierId::new(self.next_identifier_id);
        self.next_identifier_id += 1;
        self.identifiers.insert((kind, name.to_string()), id);
        self.names.insert(id, name.to_string());
        id
    }

    fn push_sample(&mut self, device: IdentifierId, stored: StoredSample) {
        let rows = self.samples.entry(device).or_default();
        let pos = rows.partition_point(|r| r.timestamp <= stored.timestamp);
        rows.insert(pos, stored);
    }

    fn to_sample(&self, stored: &StoredSample) -> Sample {
        Sample {
            value: stored.value.clone(),
            timestamp: stored.timestamp,
            units: stored.unit.and_then(|u| self.names.get(&u).cloned()),
        }
    }
}

/// Counters describing how the repository has been used.
#[derive(Default)]
struct UsageCounters {
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    day_reads: AtomicUsize,
    day_inserts: AtomicUsize,
    day_insert_attempts: AtomicUsize,
}

impl UsageCounters {
    fn enter(&self) -> ScanGuard<'_> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        let now = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, AtomicOrdering::SeqCst);
        ScanGuard(self)
    }
}

struct ScanGuard<'a>(&'a UsageCounters);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
            identifiers: Arc::new(IdentifierCache::new()),
            counters: Arc::new(UsageCounters::default()),
        }
    }

    /// Store samples for a device without going through identifier caching.
    ///
    /// This is a helper method for setting up data.
    pub fn seed_samples(&self, device_key: &str, samples: impl IntoIterator<Item = Sample>) {
        let mut data = self.data.write();
        let device = data.intern(IdentifierKind::Device, device_key);
        for sample in samples {
            let unit = sample
                .units
                .as_deref()
                .map(|u| data.intern(IdentifierKind::Unit, u));
            data.push_sample(
                device,
                StoredSample {
                    value: sample.value,
                    timestamp: sample.timestamp,
                    unit,
                },
            );
        }
    }

    /// Register a device with no samples.
    pub fn register_device(&self, device_key: &str) {
        self.data.write().intern(IdentifierKind::Device, device_key);
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    pub fn is_healthy(&self) -> bool {
        self.data.read().is_healthy
    }

    /// Make every subsequent `fetch` fail with a query error.
    pub fn set_fetch_failure(&self, message: Option<&str>) {
        self.data.write().fetch_failure = message.map(str::to_string);
    }

    /// Make every subsequent day-cache insert fail with a connection error.
    pub fn set_day_cache_writes_fail(&self, fail: bool) {
        self.data.write().day_cache_writes_fail = fail;
    }

    /// Delay applied to each `fetch` before rows are delivered.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.data.write().fetch_delay = delay;
    }

    /// Clear all data from the repository, keeping the health flag.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
        self.identifiers.clear();
    }

    /// Get the number of samples stored for a device.
    pub fn sample_count(&self, device_key: &str) -> usize {
        let data = self.data.read();
        data.device_id(device_key)
            .and_then(|id| data.samples.get(&id))
            .map_or(0, Vec::len)
    }

    /// Get the number of cached days stored for a device.
    pub fn cached_day_count(&self, device_key: &str) -> usize {
        self.data
            .read()
            .day_cache
            .keys()
            .filter(|(key, _)| key == device_key)
            .count()
    }

    /// Check if a day is cached for a device.
    pub fn has_cached_day(&self, device_key: &str, day_start: DateTime<Utc>) -> bool {
        self.data
            .read()
            .day_cache
            .contains_key(&(device_key.to_string(), day_start))
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.counters.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Highest number of `fetch` calls observed running at once.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.counters.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Number of `read_days` calls served so far.
    pub fn day_cache_reads(&self) -> usize {
        self.counters.day_reads.load(AtomicOrdering::SeqCst)
    }

    /// Number of successful day-cache inserts.
    pub fn day_cache_inserts(&self) -> usize {
        self.counters.day_inserts.load(AtomicOrdering::SeqCst)
    }

    /// Number of `insert_day` calls, failed ones included.
    pub fn day_cache_insert_attempts(&self) -> usize {
        self.counters.day_insert_attempts.load(AtomicOrdering::SeqCst)
    }

    /// Identifier cache used by sample inserts.
    pub fn identifier_cache(&self) -> &IdentifierCache {
        &self.identifiers
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }

    fn device_not_found(operation: &str, device_key: &str) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Device '{}' not found", device_key),
            ErrorContext::new(operation)
                .with_entity("device")
                .with_entity_id(device_key),
        )
    }

    /// Rows of `device_key` matching `range`, in scan order.
    fn scan(&self, device_key: &str, range: &QueryRange) -> RepositoryResult<Vec<Sample>> {
        let data = self.data.read();
        if let Some(message) = &data.fetch_failure {
            return Err(RepositoryError::query_with_context(
                message.clone(),
                ErrorContext::new("fetch")
                    .with_entity("device")
                    .with_entity_id(device_key),
            ));
        }
        let device = data
            .device_id(device_key)
            .ok_or_else(|| Self::device_not_found("fetch", device_key))?;

        let rows = data.samples.get(&device).map_or(&[][..], Vec::as_slice);
        let matching = rows.iter().filter(|r| {
            range.date_min.map_or(true, |min| r.timestamp >= min)
                && range.date_max.map_or(true, |max| r.timestamp < max)
        });
        let limit = range.limit.unwrap_or(usize::MAX);
        let selected: Vec<Sample> = match range.order {
            Order::Ascending => matching.take(limit).map(|r| data.to_sample(r)).collect(),
            Order::Descending => matching
                .rev()
                .take(limit)
                .map(|r| data.to_sample(r))
                .collect(),
        };
        Ok(selected)
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== History Repository ====================

#[async_trait]
impl HistoryRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn fetch(
        &self,
        device_key: &str,
        range: &QueryRange,
        visitor: &mut dyn SampleVisitor,
    ) -> RepositoryResult<()> {
        self.check_health()?;
        let _scan = self.counters.enter();

        let delay = self.data.read().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        for sample in self.scan(device_key, range)? {
            visitor.on_sample(sample);
        }
        visitor.on_complete();
        Ok(())
    }

    async fn last_sample(&self, device_key: &str) -> RepositoryResult<Option<Sample>> {
        self.check_health()?;
        let data = self.data.read();
        let device = data
            .device_id(device_key)
            .ok_or_else(|| Self::device_not_found("last_sample", device_key))?;
        Ok(data
            .samples
            .get(&device)
            .and_then(|rows| rows.last())
            .map(|r| data.to_sample(r)))
    }

    async fn list_devices(&self) -> RepositoryResult<Vec<String>> {
        self.check_health()?;
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .identifiers
            .keys()
            .filter(|(kind, _)| *kind == IdentifierKind::Device)
            .map(|(_, name)| name.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ==================== Day Cache Repository ====================

#[async_trait]
impl DayCacheRepository for LocalRepository {
    async fn read_days(
        &self,
        device_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<CachedDay>> {
        self.check_health()?;
        self.counters.day_reads.fetch_add(1, AtomicOrdering::SeqCst);
        if from > to {
            return Ok(Vec::new());
        }

        let data = self.data.read();
        let lower = (device_key.to_string(), from);
        let upper = (device_key.to_string(), to);
        data.day_cache
            .range(lower..=upper)
            .map(|((_, day_start), doc)| {
                serde_json::from_str(doc).map_err(|e| {
                    RepositoryError::corrupt_record(
                        format!("Day cache document does not decode: {}", e),
                        ErrorContext::new("read_days")
                            .with_entity("day_cache")
                            .with_entity_id(format!("{}/{}", device_key, day_start.to_rfc3339())),
                    )
                })
            })
            .collect()
    }

    async fn insert_day(&self, day: &CachedDay) -> RepositoryResult<()> {
        self.check_health()?;
        self.counters
            .day_insert_attempts
            .fetch_add(1, AtomicOrdering::SeqCst);
        let context = || {
            ErrorContext::new("insert_day")
                .with_entity("day_cache")
                .with_entity_id(format!("{}/{}", day.device_key, day.day_start.to_rfc3339()))
        };

        let doc = serde_json::to_string(day).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Failed to serialize day: {}", e),
                context(),
            )
        })?;

        let mut data = self.data.write();
        if data.day_cache_writes_fail {
            return Err(RepositoryError::connection_with_context(
                "Day cache is unavailable",
                context(),
            ));
        }
        let key = (day.device_key.clone(), day.day_start);
        if data.day_cache.contains_key(&key) {
            return Err(RepositoryError::duplicate_key_with_context(
                "Day already cached",
                context(),
            ));
        }
        data.day_cache.insert(key, doc);
        self.counters.day_inserts.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

// ==================== Ingest Repository ====================

#[async_trait]
impl IdentifierStore for LocalRepository {
    async fn find_identifier(
        &self,
        kind: IdentifierKind,
        name: &str,
    ) -> RepositoryResult<Option<IdentifierId>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .identifiers
            .get(&(kind, name.to_string()))
            .copied())
    }

    async fn create_identifier(
        &self,
        kind: IdentifierKind,
        name: &str,
    ) -> RepositoryResult<IdentifierId> {
        self.check_health()?;
        let mut data = self.data.write();
        if data.identifiers.contains_key(&(kind, name.to_string())) {
            return Err(RepositoryError::duplicate_key_with_context(
                format!("{} identifier already exists", kind),
                ErrorContext::new("create_identifier")
                    .with_entity(kind.to_string())
                    .with_entity_id(name),
            ));
        }
        Ok(data.intern(kind, name))
    }
}

#[async_trait]
impl IngestRepository for LocalRepository {
    async fn insert_sample(&self, device_key: &str, sample: &Sample) -> RepositoryResult<()> {
        self.check_health()?;
        let device = self
            .identifiers
            .resolve(self, IdentifierKind::Device, device_key)
            .await?;
        let unit = match sample.units.as_deref() {
            Some(units) => Some(
                self.identifiers
                    .resolve(self, IdentifierKind::Unit, units)
                    .await?,
            ),
            None => None,
        };

        self.data.write().push_sample(
            device,
            StoredSample {
                value: sample.value.clone(),
                timestamp: sample.timestamp,
                unit,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod local_tests;
