//! Persistent per-day aggregation cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::models::Bucket;

/// One materialized day of a device, keyed by the local midnight that
/// starts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDay {
    pub device_key: String,
    pub day_start: DateTime<Utc>,
    pub bucket: Bucket,
}

impl CachedDay {
    pub fn new(device_key: impl Into<String>, day_start: DateTime<Utc>, bucket: Bucket) -> Self {
        Self {
            device_key: device_key.into(),
            day_start,
            bucket,
        }
    }
}

/// Storage of [`CachedDay`] entries, unique per `(device_key, day_start)`.
#[async_trait]
pub trait DayCacheRepository: Send + Sync {
    /// Entries of `device_key` whose `day_start` lies in `[from, to]`,
    /// ascending by day.
    async fn read_days(
        &self,
        device_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<CachedDay>>;

    /// Persist one day.
    ///
    /// # Errors
    /// * `DuplicateKey` when the day is already stored for this device.
    async fn insert_day(&self, day: &CachedDay) -> RepositoryResult<()>;
}
