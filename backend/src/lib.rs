//! # xpl-history
//!
//! Storage-agnostic history engine for home-automation sensor readings.
//!
//! Devices report timestamped values (numbers, switch states, short texts).
//! The engine answers analytical queries over them:
//!
//! - **Last value**: most recent reading, served from a process-wide cache
//! - **History**: raw samples of a window
//! - **Aggregates**: zero-order-hold statistics over the whole window, per
//!   fixed-width bucket, or per calendar day through a persistent day cache
//! - **Counters**: totals of odometer-like series across resets
//!
//! ## Architecture
//!
//! - [`models`]: samples, query ranges, aggregation results, time helpers
//! - [`db`]: repository traits, the in-memory store and the factory
//! - [`services`]: the aggregation folds and [`HistoryEngine`]
//! - [`config`]: TOML configuration with `XPL_*` overrides
//! - [`api`]: query-string decoding and device path mapping
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use xpl_history::db::LocalRepository;
//! use xpl_history::models::Sample;
//! use xpl_history::HistoryEngine;
//!
//! let repo = LocalRepository::new();
//! repo.seed_samples("kitchen@temp", vec![Sample::new(21.5, chrono::Utc::now())]);
//! let engine = HistoryEngine::new(Arc::new(repo));
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let last = runtime
//!     .block_on(engine.get_last_value("kitchen@temp"))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(last.value.numeric(), 21.5);
//! ```

// RepositoryError carries a rich context
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use config::EngineConfig;
pub use services::{EngineError, EngineResult, HistoryEngine};
