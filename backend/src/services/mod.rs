//! Service layer: the aggregation folds and the engine that drives them.
//!
//! Each read operation builds a fold, hands it to the history store as a
//! visitor and shapes what the fold produced. The services depend only on
//! the repository traits, never on a concrete store.
//!
//! - [`full_range`]: whole-window statistics
//! - [`stepped`]: fixed-width and calendar-day buckets
//! - [`day_cache`]: calendar-day buckets backed by the per-day cache
//! - [`cumulative`]: counter totals across resets
//! - [`last_value`]: process-wide last-value cache
//! - [`ingest`]: sensor messages to stored samples
//! - [`engine`]: [`HistoryEngine`], the entry point tying them together

pub mod cumulative;
pub mod day_cache;
pub mod engine;
pub mod error;
pub mod full_range;
pub mod ingest;
pub mod last_value;
pub mod stepped;

mod units;

pub use engine::{HistoryEngine, LastValues};
pub use error::{EngineError, EngineResult};
pub use ingest::SensorMessage;
pub use last_value::LastValueCache;
