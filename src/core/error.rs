use super::{EntityType, RecordId};
use std::time::Duration;
use thiserror::Error;

/// Raw failure raised by a storage engine or by input checks in front of it.
///
/// This is the vocabulary of the storage boundary. Callers of the record
/// store never branch on it directly; it is classified once into an
/// [`AppError`](crate::error::AppError) by the error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityType, id: RecordId },

    #[error("Optimistic lock conflict for '{entity}:{id}': expected version {expected}, actual {actual}")]
    VersionMismatch {
        entity: EntityType,
        id: RecordId,
        expected: u64,
        actual: u64,
    },

    #[error("Optimistic lock conflict for '{entity}:{id}': gave up after {attempts} attempts")]
    RetriesExhausted {
        entity: EntityType,
        id: RecordId,
        attempts: usize,
    },

    #[error("Version counter exhausted for '{entity}:{id}'")]
    VersionOverflow { entity: EntityType, id: RecordId },

    #[error("Unique constraint violation on {entity}.{field}: value {value} already used by '{existing}'")]
    UniqueViolation {
        entity: EntityType,
        field: String,
        value: String,
        existing: RecordId,
    },

    #[error("Foreign key violation on {entity}.{field}: {detail}")]
    ForeignKeyViolation {
        entity: EntityType,
        field: String,
        detail: String,
    },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transaction {0} is no longer active")]
    TransactionClosed(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// `true` for the two outcomes of a failed compare-and-swap.
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionMismatch { .. } | StoreError::RetriesExhausted { .. }
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_detection() {
        let id = RecordId::new();
        let mismatch = StoreError::VersionMismatch {
            entity: EntityType::Contact,
            id,
            expected: 3,
            actual: 4,
        };
        assert!(mismatch.is_version_conflict());
        assert!(mismatch.to_string().contains("expected version 3, actual 4"));

        let missing = StoreError::NotFound {
            entity: EntityType::Deal,
            id,
        };
        assert!(!missing.is_version_conflict());
        assert_eq!(missing.to_string(), format!("deal '{}' not found", id));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, StoreError::IoError(msg) if msg.contains("disk full")));
    }
}
