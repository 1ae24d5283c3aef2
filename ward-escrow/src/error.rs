//! Escrow error types.

use thiserror::Error;
use ward_types::AuthorityId;

/// Result type for escrow operations.
pub type EscrowResult<T> = Result<T, EscrowError>;

/// Errors from the authority directory and unseal gateway.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("authority already registered: {0}")]
    DuplicateAuthority(AuthorityId),

    #[error("unknown authority: {0}")]
    UnknownAuthority(AuthorityId),

    #[error("directory access failed: {0}")]
    Directory(String),

    #[error("gateway error for {authority}: {reason}")]
    Gateway {
        authority: AuthorityId,
        reason: String,
    },
}
