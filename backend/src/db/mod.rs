//! Storage layer for device history.
//!
//! This module provides abstractions for storage operations via the Repository pattern,
//! allowing different storage backends to be swapped easily.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  HistoryEngine (services) - aggregation and caching     │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface   │
//! │  - HistoryRepository: streamed sample scans             │
//! │  - DayCacheRepository: materialized days                │
//! │  - IngestRepository: sample writes                      │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────▼──────────────────────────────┐
//!     │             Local Repository                  │
//!     │               (in-memory)                     │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - `repository`: Trait definitions and error types
//! - `repositories::local`: In-memory implementation for unit testing and local development
//! - `identifiers`: Identifier interning cache used by storage adapters
//! - `factory`: Factory for creating repository instances

#[cfg(not(feature = "local-repo"))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod identifiers;
pub mod repositories;
pub mod repository;

pub use factory::{RepositoryFactory, RepositoryType};
pub use identifiers::IdentifierCache;
pub use repositories::LocalRepository;
pub use repository::{
    CachedDay, DayCacheRepository, ErrorContext, FoldVisitor, FullRepository, HistoryRepository,
    IngestRepository, RepositoryError, RepositoryResult, SampleCollector, SampleVisitor,
};
