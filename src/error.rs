//! Error types for the index engine

use thiserror::Error;

use crate::{IndexId, ItemId};

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Database`](crate::Database), [`Writer`](crate::Writer)
/// and [`Searcher`](crate::Searcher).
///
/// Every variant except [`Error::Storage`] means the operation was rejected
/// before anything was applied.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Metric mismatch: index uses {expected:?}, got {actual:?}")]
    MetricMismatch {
        expected: crate::Metric,
        actual: crate::Metric,
    },

    #[error("Item {id} already exists")]
    DuplicateId { id: ItemId },

    #[error("Item not found: {id}")]
    ItemNotFound { id: ItemId },

    #[error("Index not found: {index}")]
    IndexNotFound { index: IndexId },

    #[error("A writer is already open on index {index}")]
    WriterBusy { index: IndexId },

    #[error("Cannot create index {index}: the database already holds {max} indexes")]
    IndexLimitReached { index: IndexId, max: u32 },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    /// Whether the environment should be considered unusable and the
    /// [`Database`](crate::Database) reopened.
    ///
    /// Rejections (bad input, id contracts, busy writers, quotas, version
    /// checks) leave the database untouched and return `false`.
    pub fn requires_reopen(&self) -> bool {
        match self {
            Error::Storage(e) => e.requires_reopen(),
            _ => false,
        }
    }
}

/// Failures of the storage backend or of the persisted layout.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] redb::Error),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Incompatible index version {found}, this engine supports up to {supported}")]
    IncompatibleVersion { found: u32, supported: u32 },

    #[error("Map size exceeded: commit needs {required} bytes, limit is {limit}")]
    MapFull { required: u64, limit: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    fn requires_reopen(&self) -> bool {
        match self {
            StorageError::Io(_) | StorageError::Backend(_) | StorageError::Corrupted(_) => true,
            StorageError::IncompatibleVersion { .. }
            | StorageError::MapFull { .. }
            | StorageError::Serialization(_) => false,
        }
    }
}

impl From<redb::Error> for Error {
    fn from(e: redb::Error) -> Self {
        Error::Storage(StorageError::Backend(e))
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(e: redb::DatabaseError) -> Self {
        redb::Error::from(e).into()
    }
}

impl From<redb::TransactionError> for Error {
    fn from(e: redb::TransactionError) -> Self {
        redb::Error::from(e).into()
    }
}

impl From<redb::TableError> for Error {
    fn from(e: redb::TableError) -> Self {
        redb::Error::from(e).into()
    }
}

impl From<redb::StorageError> for Error {
    fn from(e: redb::StorageError) -> Self {
        redb::Error::from(e).into()
    }
}

impl From<redb::CommitError> for Error {
    fn from(e: redb::CommitError) -> Self {
        redb::Error::from(e).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_do_not_require_reopen() {
        assert!(!Error::WriterBusy { index: 0 }.requires_reopen());
        assert!(!Error::DimensionMismatch { expected: 3, actual: 2 }.requires_reopen());
        assert!(!Error::from(StorageError::IncompatibleVersion { found: 9, supported: 1 })
            .requires_reopen());
        assert!(!Error::from(StorageError::MapFull { required: 10, limit: 5 }).requires_reopen());
    }

    #[test]
    fn test_backend_failures_require_reopen() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(Error::from(StorageError::Io(io)).requires_reopen());
        assert!(Error::from(StorageError::Corrupted("bad crc".into())).requires_reopen());
    }

    #[test]
    fn test_display() {
        let e = Error::DimensionMismatch { expected: 3, actual: 4 };
        assert_eq!(e.to_string(), "Dimension mismatch: expected 3, got 4");
    }
}
