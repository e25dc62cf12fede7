//! Repository trait definitions for the history store.
//!
//! The store is split into focused traits so that the aggregation services
//! only depend on what they read or write.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`history`]: Streaming sample reads and the visitor interface
//! - [`day_cache`]: Materialized per-day buckets
//! - [`ingest`]: Sample writes and identifier interning
//!
//! # Convenience Trait Bound
//!
//! Functions that need every capability can use [`FullRepository`]:
//!
//! ```ignore
//! async fn rebuild<R: FullRepository + ?Sized>(repo: &R, key: &str) -> RepositoryResult<()> {
//!     let last = repo.last_sample(key).await?;
//!     repo.read_days(key, from, to).await?;
//!     Ok(())
//! }
//! ```

pub mod day_cache;
pub mod error;
pub mod history;
pub mod ingest;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use day_cache::{CachedDay, DayCacheRepository};
pub use history::{FoldVisitor, HistoryRepository, SampleCollector, SampleVisitor};
pub use ingest::{IdentifierId, IdentifierKind, IdentifierStore, IngestRepository};

/// Composite trait bound for a complete history store.
///
/// Automatically implemented for any type implementing the three store
/// traits.
pub trait FullRepository: HistoryRepository + DayCacheRepository + IngestRepository {}

impl<T> FullRepository for T where T: HistoryRepository + DayCacheRepository + IngestRepository {}
