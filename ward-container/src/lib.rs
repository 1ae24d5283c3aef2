//! Cryptainer model and codec.
//!
//! A container is the persisted unit of the recording pipeline: one chunk's
//! authenticated ciphertext, one sealed key shard per escrow authority bound
//! to the session, the plaintext fingerprint, and a structural seal over the
//! whole encoded record. A container is either fully valid (seal verifies,
//! all shards present) or unusable; there is no partial-validity state.

mod codec;
mod error;

pub use codec::{decode, encode, FORMAT_VERSION};
pub use error::{CodecError, CodecResult};

use serde::{Deserialize, Serialize};
use ward_crypto::{EncryptedPayload, SealedShard, FINGERPRINT_SIZE};
use ward_types::{AuthorityId, ContainerRef, SessionId, StreamId, TimeRange};

/// One escrow authority's sealed copy of a container's chunk key.
///
/// The key fingerprint identifies which of the authority's public keys was
/// used to seal, so the record can be checked against the authority's current
/// key without ambiguity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShardRecord {
    pub authority: AuthorityId,
    /// SHA-256 of the authority public key used for sealing.
    pub key_fingerprint: [u8; FINGERPRINT_SIZE],
    pub sealed_key: SealedShard,
}

/// The persisted unit: one encrypted chunk plus its escrow shard records.
///
/// Immutable once appended to the store. Corrections are made by appending a
/// replacement container and marking this one superseded in the session
/// index, never by editing in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub session: SessionId,
    pub sequence: u64,
    pub stream: StreamId,
    pub range: TimeRange,
    /// Authenticated ciphertext of the chunk payload.
    pub payload: EncryptedPayload,
    /// One record per escrow authority bound at session start, ordered by
    /// authority id.
    pub shards: Vec<KeyShardRecord>,
    /// SHA-256 of the plaintext chunk, re-verified after decryption.
    pub fingerprint: [u8; FINGERPRINT_SIZE],
    /// SHA-256 structural seal over the encoded header, ciphertext and shard
    /// records. Verified on every decode.
    pub seal: [u8; 32],
}

impl Container {
    /// Computes the structural seal for the container's current contents.
    pub fn compute_seal(&self) -> CodecResult<[u8; 32]> {
        codec::compute_seal(self)
    }

    /// Fills in the structural seal, consuming and returning the container.
    pub fn sealed(mut self) -> CodecResult<Self> {
        self.seal = self.compute_seal()?;
        Ok(self)
    }

    /// Serializes to the versioned wire format.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        codec::encode(self)
    }

    /// The store reference for this container.
    pub fn container_ref(&self) -> ContainerRef {
        ContainerRef::new(self.session, self.sequence)
    }

    /// Looks up the shard record sealed for a given authority.
    pub fn shard_for(&self, authority: &AuthorityId) -> Option<&KeyShardRecord> {
        self.shards.iter().find(|s| &s.authority == authority)
    }
}
