//! Decryption authorization workflow.
//!
//! A decryption request moves through a small state machine:
//!
//! ```text
//! Requested -> AwaitingApprovals -> QuorumMet -> Decrypted
//!                     |                 |
//!                     +-> Denied        +-> Rejected (tamper)
//!                     +-> Cancelled
//! ```
//!
//! Each requested authority is queried concurrently through the escrow
//! gateway under its own timeout; the workflow never blocks on a slow
//! authority beyond that timeout and reaches quorum as soon as the approved
//! weight crosses the threshold, even while stragglers are still pending.
//!
//! Quorum here is a policy gate over independent seals, not secret sharing:
//! every shard holds the whole chunk key, sealed separately, and any
//! sufficient subset of approvals recovers the same key.

mod error;
mod workflow;

pub use error::{AuthorizeError, AuthorizeResult};
pub use workflow::{
    AuthorityOutcome, AuthorityVerdict, DecryptionWorkflow, RequestHandle, RequestState,
    WorkflowConfig, WorkflowReport,
};
