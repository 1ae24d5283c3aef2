//! Sealing error types.
//!
//! Any sealing failure is fatal to the in-progress chunk: capture pauses and
//! the error is surfaced to the operator. Silently dropping escrow coverage
//! is never acceptable.

use thiserror::Error;
use ward_types::AuthorityId;

/// Result type for the cryptainer builder.
pub type SealingResult<T> = Result<T, SealingError>;

/// Errors from sealing a chunk into a container.
#[derive(Debug, Error)]
pub enum SealingError {
    /// A session with no escrow authorities could never be decrypted by
    /// quorum; refusing up front beats producing unopenable containers.
    #[error("no escrow authorities bound to session")]
    NoAuthorities,

    #[error("malformed public key for authority {authority}: {reason}")]
    MalformedKey {
        authority: AuthorityId,
        reason: String,
    },

    #[error("sealing chunk key for authority {authority} failed: {reason}")]
    Seal {
        authority: AuthorityId,
        reason: String,
    },

    #[error("chunk payload encryption failed: {0}")]
    Encrypt(String),

    #[error("container seal computation failed: {0}")]
    Codec(String),
}
