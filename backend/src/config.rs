//! Engine configuration file support.
//!
//! Settings are read from a TOML file (`xpl-history.toml`) and can be
//! overridden by `XPL_*` environment variables:
//!
//! ```toml
//! [repository]
//! type = "local"
//!
//! [engine]
//! backfill_concurrency = 4
//! batch_concurrency = 8
//! default_window_hours = 24
//! utc_offset_minutes = 60
//! bucket_sum_mode = "apportioned"
//!
//! [ingest.device_aliases]
//! "old-lamp" = "hall-lamp"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::db::factory::RepositoryType;
use crate::models::{BucketSumMode, LocalCalendar};

/// Name of the configuration file searched by [`EngineConfig::from_default_location`].
pub const CONFIG_FILE_NAME: &str = "xpl-history.toml";

/// Longest accepted default window: ten years.
pub const MAX_WINDOW_HOURS: i64 = 24 * 366 * 10;

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Aggregation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Missing days computed at once by the day cache.
    #[serde(default = "default_backfill_concurrency")]
    pub backfill_concurrency: usize,
    /// Devices looked up at once by batch last-value reads.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Span of the window used when a query names no dates.
    #[serde(default = "default_window_hours")]
    pub default_window_hours: i64,
    /// Fixed zone for calendar days; the host zone when absent.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub bucket_sum_mode: BucketSumMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backfill_concurrency: default_backfill_concurrency(),
            batch_concurrency: default_batch_concurrency(),
            default_window_hours: default_window_hours(),
            utc_offset_minutes: None,
            bucket_sum_mode: BucketSumMode::default(),
        }
    }
}

impl EngineSettings {
    /// Span of the default window, `None` unless `default_window_hours` is
    /// within `1..=MAX_WINDOW_HOURS`.
    pub fn default_window(&self) -> Option<TimeDelta> {
        (1..=MAX_WINDOW_HOURS)
            .contains(&self.default_window_hours)
            .then(|| TimeDelta::try_hours(self.default_window_hours))
            .flatten()
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Device renames applied before a message is stored.
    #[serde(default)]
    pub device_aliases: BTreeMap<String, String>,
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_backfill_concurrency() -> usize {
    4
}

fn default_batch_concurrency() -> usize {
    8
}

fn default_window_hours() -> i64 {
    24
}

impl FromStr for EngineConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        content
            .parse::<EngineConfig>()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `xpl-history.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self> {
        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ];

        match search_paths.iter().find(|p| p.exists()) {
            Some(path) => Self::from_file(path),
            None => bail!("No {} found in standard locations", CONFIG_FILE_NAME),
        }
    }

    /// File from the default location when present, defaults otherwise, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::from_default_location() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default configuration: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `XPL_*` environment variables on top of the current values.
    ///
    /// # Environment Variables
    /// - `XPL_REPOSITORY_TYPE`
    /// - `XPL_BACKFILL_CONCURRENCY`
    /// - `XPL_BATCH_CONCURRENCY`
    /// - `XPL_DEFAULT_WINDOW_HOURS`
    /// - `XPL_UTC_OFFSET_MINUTES`
    /// - `XPL_BUCKET_SUM_MODE` (`apportioned` | `attributed`)
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("XPL_REPOSITORY_TYPE") {
            self.repository.repo_type = val;
        }
        if let Some(n) = parse_env("XPL_BACKFILL_CONCURRENCY")? {
            self.engine.backfill_concurrency = n;
        }
        if let Some(n) = parse_env("XPL_BATCH_CONCURRENCY")? {
            self.engine.batch_concurrency = n;
        }
        if let Some(hours) = parse_env("XPL_DEFAULT_WINDOW_HOURS")? {
            self.engine.default_window_hours = hours;
        }
        if let Some(minutes) = parse_env("XPL_UTC_OFFSET_MINUTES")? {
            self.engine.utc_offset_minutes = Some(minutes);
        }
        if let Ok(val) = env::var("XPL_BUCKET_SUM_MODE") {
            self.engine.bucket_sum_mode = val
                .parse::<BucketSumMode>()
                .map_err(anyhow::Error::msg)
                .context("Invalid XPL_BUCKET_SUM_MODE")?;
        }
        self.validate()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.repository_type()
            .map_err(anyhow::Error::msg)
            .context("Invalid repository type")?;
        if self.engine.backfill_concurrency == 0 {
            bail!("engine.backfill_concurrency must be positive");
        }
        if self.engine.batch_concurrency == 0 {
            bail!("engine.batch_concurrency must be positive");
        }
        if self.engine.default_window().is_none() {
            bail!(
                "engine.default_window_hours must be between 1 and {}, got {}",
                MAX_WINDOW_HOURS,
                self.engine.default_window_hours
            );
        }
        self.calendar()?;
        Ok(())
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Calendar used for day boundaries.
    pub fn calendar(&self) -> Result<LocalCalendar> {
        match self.engine.utc_offset_minutes {
            None => Ok(LocalCalendar::system()),
            Some(minutes) => LocalCalendar::fixed_offset_minutes(minutes).with_context(|| {
                format!("engine.utc_offset_minutes out of range: {}", minutes)
            }),
        }
    }

    /// Window used when a query names no dates.
    pub fn default_window(&self) -> Option<TimeDelta> {
        self.engine.default_window()
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}: {}", key, e)),
        Err(_) => Ok(None),
    }
}
