//! Recorder error types.

use thiserror::Error;
use ward_authorize::AuthorizeError;
use ward_cryptainer::SealingError;
use ward_escrow::EscrowError;
use ward_store::StoreError;
use ward_types::{AuthorityId, RequestId, SessionId};

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Errors from the capture orchestrator and the operator service.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Only one recording session runs at a time.
    #[error("a recording session is already active: {0}")]
    SessionActive(SessionId),

    #[error("no recording session is active")]
    NoActiveSession,

    /// Sessions bind authorities at start; an inactive one cannot join.
    #[error("authority {0} is inactive and cannot be bound to a new session")]
    InactiveAuthority(AuthorityId),

    #[error("unknown decryption request: {0}")]
    UnknownRequest(RequestId),

    /// The seal pipeline could not keep up with capture. The session fails
    /// rather than silently dropping chunks or corrupting sequence order;
    /// a fresh session can be started afterwards.
    #[error("capture overrun at sequence {sequence}: seal pipeline backlogged")]
    CaptureOverrun { sequence: u64 },

    #[error("frame source failed: {0}")]
    Source(String),

    #[error("pipeline task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Sealing(#[from] SealingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Authorize(#[from] AuthorizeError),
}
