//! Error types for tracker operations

use thiserror::Error;

use crate::models::EntityKind;
use crate::storage::StorageError;

/// Errors returned by the tracker's local operations
///
/// Every variant is raised before any in-memory state changes, so a failed
/// call never leaves a half-applied mutation behind.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Malformed or missing input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The operation targets an id that does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: u64 },

    /// Durable store read/write failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A mutation was issued before the tracker finished loading
    #[error("Tracker is not initialized yet; call wait_for_initialization() first")]
    NotInitialized,
}

impl TallyError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        TallyError::Validation(message.into())
    }

    pub(crate) fn event_not_found(id: u64) -> Self {
        TallyError::NotFound {
            entity: EntityKind::Event,
            id,
        }
    }

    pub(crate) fn record_not_found(id: u64) -> Self {
        TallyError::NotFound {
            entity: EntityKind::Record,
            id,
        }
    }

    /// Whether this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TallyError::Validation(_) | TallyError::NotFound { .. }
        )
    }
}

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = TallyError::event_not_found(42);
        assert_eq!(err.to_string(), "event 42 not found");

        let err = TallyError::record_not_found(7);
        assert_eq!(err.to_string(), "record 7 not found");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(TallyError::validation("title is required").is_client_error());
        assert!(TallyError::event_not_found(1).is_client_error());
        assert!(!TallyError::NotInitialized.is_client_error());
        assert!(!TallyError::Storage(StorageError::Unavailable("down".into())).is_client_error());
    }
}
