//! Codec error types.
//!
//! Every variant is fatal to the single container being decoded, never to
//! the rest of the store: enumeration callers log and skip.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors from encoding or decoding a container.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bad magic, unknown version, trailing bytes, or an undecodable body.
    #[error("container format error: {0}")]
    Format(String),

    /// The embedded structural seal does not match the encoded content.
    #[error("container integrity seal mismatch")]
    Integrity,

    /// Input shorter than the declared frame; the signature of a
    /// crash-interrupted write.
    #[error("truncated container: need {expected} bytes, have {actual}")]
    Truncation { expected: usize, actual: usize },
}
