//! Escrow authority records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ward_crypto::{fingerprint, CryptoResult, FINGERPRINT_SIZE};
use ward_types::AuthorityId;

/// Policy an authority applies before releasing (unsealing) a key shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleasePolicy {
    /// The authority's operator must explicitly approve each request.
    Manual,
    /// The authority approves automatically once the recording is older
    /// than the configured delay.
    DelayedAutoRelease { delay: Duration },
}

/// One independent trust authority.
///
/// The core never holds the private half of the key. Authorities are never
/// deleted, only flagged inactive, so historical containers that reference
/// them stay verifiable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAuthority {
    pub id: AuthorityId,
    /// X25519 public encryption key, raw bytes. Validated at seal time.
    pub public_key: Vec<u8>,
    /// Weight this authority contributes toward a decryption quorum.
    pub weight: u32,
    pub policy: ReleasePolicy,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

impl EscrowAuthority {
    /// A manually-approving authority with weight 1, the common case.
    pub fn new(id: impl Into<AuthorityId>, public_key: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            public_key,
            weight: 1,
            policy: ReleasePolicy::Manual,
            active: true,
            registered_at: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_policy(mut self, policy: ReleasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// SHA-256 fingerprint of the public key, stored in shard records so a
    /// record can be matched against the authority's current key without
    /// ambiguity.
    pub fn key_fingerprint(&self) -> [u8; FINGERPRINT_SIZE] {
        fingerprint(&self.public_key)
    }

    /// Parses the raw public key bytes, failing on malformed material.
    pub fn parsed_public_key(&self) -> CryptoResult<ward_crypto::PublicKey> {
        ward_crypto::shard::parse_public_key(&self.public_key)
    }
}
