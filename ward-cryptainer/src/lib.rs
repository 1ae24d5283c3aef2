//! Cryptainer builder: raw chunk in, sealed container out.
//!
//! The builder generates a fresh symmetric key per chunk, encrypts the
//! payload with it, seals a copy of the key for every escrow authority bound
//! to the session, and assembles the container with its plaintext
//! fingerprint and structural seal. It performs no I/O; persisting the
//! result is the store's job.
//!
//! Escrow coverage is all-or-nothing: if sealing fails for any listed
//! authority the whole container is aborted, because a container missing one
//! shard could never be authorized by the quorum it was configured for.

mod error;

pub use error::{SealingError, SealingResult};

use tracing::debug;
use ward_container::{Container, KeyShardRecord};
use ward_crypto::{encrypt_chunk, fingerprint, seal_key, ChunkKey};
use ward_escrow::EscrowAuthority;
use ward_types::{Chunk, SessionId};

/// Seals one chunk into a container for the given session position.
///
/// `authorities` is the session's authority snapshot, taken at session
/// start. Shards are ordered by authority id regardless of input order, so
/// independently built containers for the same chunk are comparable.
pub fn seal_chunk(
    chunk: &Chunk,
    session: SessionId,
    sequence: u64,
    authorities: &[EscrowAuthority],
) -> SealingResult<Container> {
    if authorities.is_empty() {
        return Err(SealingError::NoAuthorities);
    }

    let mut ordered: Vec<&EscrowAuthority> = authorities.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    // Fresh key per chunk; a compromised approval for one chunk must never
    // help decrypt any other.
    let key = ChunkKey::generate();

    let payload = encrypt_chunk(&key, &chunk.data)
        .map_err(|e| SealingError::Encrypt(e.to_string()))?;

    let mut shards = Vec::with_capacity(ordered.len());
    for authority in ordered {
        let public_key =
            authority
                .parsed_public_key()
                .map_err(|e| SealingError::MalformedKey {
                    authority: authority.id.clone(),
                    reason: e.to_string(),
                })?;

        let sealed_key =
            seal_key(key.as_bytes(), &public_key).map_err(|e| SealingError::Seal {
                authority: authority.id.clone(),
                reason: e.to_string(),
            })?;

        shards.push(KeyShardRecord {
            authority: authority.id.clone(),
            key_fingerprint: authority.key_fingerprint(),
            sealed_key,
        });
    }

    let container = Container {
        session,
        sequence,
        stream: chunk.stream.clone(),
        range: chunk.range,
        payload,
        shards,
        fingerprint: fingerprint(&chunk.data),
        seal: [0u8; 32],
    }
    .sealed()
    .map_err(|e| SealingError::Codec(e.to_string()))?;

    debug!(
        session = %session,
        sequence,
        bytes = chunk.len(),
        shards = container.shards.len(),
        "chunk sealed"
    );

    Ok(container)
}
