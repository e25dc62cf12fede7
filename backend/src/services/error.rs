//! Errors surfaced by the engine operations.

use crate::db::repository::RepositoryError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error returned to callers of [`crate::services::HistoryEngine`].
///
/// An empty range is not an error: operations return `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The device key has never been stored.
    #[error("Unknown device: {device_key}")]
    NotFound { device_key: String },

    /// The request parameters are inconsistent.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An ingested message could not be turned into a sample.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The history source failed; the query was aborted.
    #[error("History source error: {0}")]
    Source(#[source] RepositoryError),
}

impl EngineError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Map a repository error raised while serving `device_key`.
    pub fn from_repository(device_key: &str, err: RepositoryError) -> Self {
        if err.is_not_found() {
            Self::NotFound {
                device_key: device_key.to_string(),
            }
        } else {
            Self::Source(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        if err.is_not_found() {
            let device_key = err.context().entity_id.clone().unwrap_or_default();
            Self::NotFound { device_key }
        } else {
            Self::Source(err)
        }
    }
}
