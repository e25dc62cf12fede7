//! Write side: storing samples and interning identifiers.

use std::fmt;

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::Sample;

crate::define_id_type!(i64, IdentifierId);

/// Namespaces of interned names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentifierKind {
    Device,
    Unit,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Device => f.write_str("device"),
            IdentifierKind::Unit => f.write_str("unit"),
        }
    }
}

/// Name-to-id table behind identifier interning.
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    /// Id of an existing name.
    async fn find_identifier(
        &self,
        kind: IdentifierKind,
        name: &str,
    ) -> RepositoryResult<Option<IdentifierId>>;

    /// Create a new name.
    ///
    /// # Errors
    /// * `DuplicateKey` when another writer created the same name first.
    async fn create_identifier(
        &self,
        kind: IdentifierKind,
        name: &str,
    ) -> RepositoryResult<IdentifierId>;
}

/// Appending samples to a device's history.
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// Store one sample. Unknown devices are created on first write.
    async fn insert_sample(&self, device_key: &str, sample: &Sample) -> RepositoryResult<()>;
}
