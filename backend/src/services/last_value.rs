//! Process-wide cache of each device's most recent reading.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::RwLock;

use super::error::{EngineError, EngineResult};
use crate::db::repository::HistoryRepository;
use crate::models::LastValueEntry;

/// Map of device key to most recent reading.
///
/// An entry is replaced only by a reading at least as recent. The
/// comparison and the write take the lock separately, so two updates racing
/// on the same key can leave the older one in place until the next update.
#[derive(Debug, Default)]
pub struct LastValueCache {
    entries: RwLock<HashMap<String, LastValueEntry>>,
}

impl LastValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_key: &str) -> Option<LastValueEntry> {
        self.entries.read().get(device_key).cloned()
    }

    /// True when a reading at `timestamp` may replace the stored one.
    pub fn should_accept(&self, device_key: &str, timestamp: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .get(device_key)
            .map_or(true, |stored| timestamp >= stored.timestamp)
    }

    /// Write `entry` without comparing timestamps.
    pub fn store(&self, entry: LastValueEntry) {
        self.entries.write().insert(entry.device_key.clone(), entry);
    }

    /// Store `entry` unless a newer reading is already cached. Returns
    /// whether the entry was stored.
    pub fn offer(&self, entry: LastValueEntry) -> bool {
        if !self.should_accept(&entry.device_key, entry.timestamp) {
            debug!(
                "Ignoring stale reading for '{}' at {}",
                entry.device_key,
                entry.timestamp.to_rfc3339()
            );
            return false;
        }
        self.store(entry);
        true
    }

    pub fn remove(&self, device_key: &str) -> Option<LastValueEntry> {
        self.entries.write().remove(device_key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Most recent reading of `device_key`, from the cache or, on a miss, from
/// the history source (which then populates the cache).
pub async fn get_last<R>(
    repo: &R,
    cache: &LastValueCache,
    device_key: &str,
) -> EngineResult<Option<LastValueEntry>>
where
    R: HistoryRepository + ?Sized,
{
    if let Some(entry) = cache.get(device_key) {
        return Ok(Some(entry));
    }

    let sample = repo
        .last_sample(device_key)
        .await
        .map_err(|e| EngineError::from_repository(device_key, e))?;
    let Some(sample) = sample else {
        return Ok(None);
    };

    let entry = LastValueEntry::from_sample(device_key, &sample);
    cache.offer(entry.clone());
    Ok(cache.get(device_key).or(Some(entry)))
}

#[cfg(test)]
#[path = "last_value_tests.rs"]
mod last_value_tests;
