//! Authorization workflow error types.

use thiserror::Error;
use ward_escrow::EscrowError;
use ward_types::AuthorityId;

/// Result type for authorization operations.
pub type AuthorizeResult<T> = Result<T, AuthorizeError>;

/// Errors from the decryption authorization workflow.
///
/// Ordinary denials, timeouts and tampering are not errors: they terminate
/// the request with a per-authority report (`Denied`, or `Rejected` when a
/// quorum-approved key fails authenticity verification). Errors here are
/// configuration problems caught before any authority is queried, plus
/// unusable key material.
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// A requested authority has no shard record in this container.
    #[error("authority {0} has no shard in this container")]
    ShardMissing(AuthorityId),

    #[error("no authorities requested")]
    NoAuthorities,

    #[error("quorum threshold must be positive")]
    InvalidQuorum,

    /// An approved shard did not contain a usable chunk key.
    #[error("recovered key invalid: {0}")]
    KeyReconstruction(String),

    #[error(transparent)]
    Escrow(#[from] EscrowError),
}
