//! Store error types.

use std::path::PathBuf;
use thiserror::Error;
use ward_container::CodecError;
use ward_types::ContainerRef;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the durable recording store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Disk is out of space. Not retryable; operator action required.
    #[error("storage full writing {path}")]
    StorageFull { path: PathBuf },

    /// A transient I/O failure persisted through the whole retry budget.
    #[error("append failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// A container with this sequence index is already published; appends
    /// never overwrite.
    #[error("container already exists: {0}")]
    DuplicateSequence(ContainerRef),

    #[error("container not found: {0}")]
    NotFound(ContainerRef),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("session index unreadable: {0}")]
    Index(String),
}
