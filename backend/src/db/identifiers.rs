//! Identifier interning with a process-local cache.
//!
//! Device keys and unit names are stored once in an identifier table and
//! referenced by id. Resolution goes cache → lookup → insert; a concurrent
//! writer inserting the same name first surfaces as `DuplicateKey`, after
//! which the lookup is retried a bounded number of times.

use std::collections::HashMap;

use log::debug;
use parking_lot::RwLock;

use super::repository::{
    ErrorContext, IdentifierId, IdentifierKind, IdentifierStore, RepositoryError,
    RepositoryResult,
};

/// Attempts of the lookup/insert cycle before giving up.
pub const MAX_ATTEMPTS: usize = 3;

/// Cache of resolved identifiers, owned by a storage adapter.
#[derive(Debug, Default)]
pub struct IdentifierCache {
    entries: RwLock<HashMap<(IdentifierKind, String), IdentifierId>>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached id of `name`, without touching the store.
    pub fn get(&self, kind: IdentifierKind, name: &str) -> Option<IdentifierId> {
        self.entries.read().get(&(kind, name.to_string())).copied()
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

    fn remember(&self, kind: IdentifierKind, name: &str, id: IdentifierId) {
        self.entries.write().insert((kind, name.to_string()), id);
    }

    /// Id of `name`, created in `store` when missing.
    ///
    /// # Errors
    /// * Any store error other than `DuplicateKey`.
    /// * `InternalError` when every attempt lost the insert race.
    pub async fn resolve<S>(
        &self,
        store: &S,
        kind: IdentifierKind,
        name: &str,
    ) -> RepositoryResult<IdentifierId>
    where
        S: IdentifierStore + ?Sized,
    {
        if let Some(id) = self.get(kind, name) {
            return Ok(id);
        }

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(id) = store.find_identifier(kind, name).await? {
                self.remember(kind, name, id);
                return Ok(id);
            }
            match store.create_identifier(kind, name).await {
                Ok(id) => {
                    debug!("Interned {} '{}' as {}", kind, name, id);
                    self.remember(kind, name, id);
                    return Ok(id);
                }
                Err(e) if e.is_duplicate_key() => {
                    debug!(
                        "Lost insert race for {} '{}' (attempt {}/{})",
                        kind, name, attempt, MAX_ATTEMPTS
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::internal_with_context(
            format!("Could not resolve {} identifier after {} attempts", kind, MAX_ATTEMPTS),
            ErrorContext::new("resolve_identifier")
                .with_entity(kind.to_string())
                .with_entity_id(name),
        ))
    }
}

#[cfg(test)]
#[path = "identifiers_tests.rs"]
mod identifiers_tests;
