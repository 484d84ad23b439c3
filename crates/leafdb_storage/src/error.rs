//! Error types for storage operations.

use crate::file::AccessMode;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted content is not a valid serialized snapshot, or a
    /// snapshot could not be serialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write was attempted on a storage opened without write permission.
    #[error("cannot write to storage opened in {mode} mode")]
    ReadOnly {
        /// The access mode the storage was opened with.
        mode: AccessMode,
    },

    /// `begin` was called while a transaction is already open.
    #[error("transaction already in progress")]
    TransactionInProgress,

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no transaction in progress")]
    NoTransaction,

    /// The storage handle has been closed.
    #[error("storage is closed")]
    Closed,
}
