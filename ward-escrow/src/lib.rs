//! Escrow authority directory and unseal gateway for Witness Ward.
//!
//! An escrow authority is an independent trust party: the core holds only
//! its public encryption key, its quorum weight, and its release policy.
//! The directory is the single process-wide registry of authorities; it is
//! read-mostly, append-only, and injected into the builder and the
//! authorization workflow rather than living as ambient global state.
//!
//! Unsealing (the authority decrypting its key shard) happens behind the
//! [`EscrowGateway`] trait. Real deployments put a network transport or a
//! hardware token behind it; [`LocalEscrowGateway`] implements it in-process
//! for local authorities and tests.

mod authority;
mod directory;
mod error;
pub mod gateway;

pub use authority::{EscrowAuthority, ReleasePolicy};
pub use directory::EscrowDirectory;
pub use error::{EscrowError, EscrowResult};
pub use gateway::{EscrowGateway, LocalEscrowGateway, UnsealOutcome, UnsealRequest};
