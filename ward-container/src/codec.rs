//! Versioned binary wire format for containers.
//!
//! Frame layout:
//!
//! ```text
//! +-------+---------+----------+------------------+------------+
//! | magic | version | body_len | body (bincode)   | seal       |
//! | WARD  | u16 LE  | u32 LE   | body_len bytes   | 32 bytes   |
//! +-------+---------+----------+------------------+------------+
//! ```
//!
//! The seal is SHA-256 over everything before it, so any byte flip in the
//! header, ciphertext or shard records is caught at decode time. The encoder
//! always writes the latest version; the decoder additionally accepts
//! version 1 bodies (recorded before streams carried identifiers).

use crate::error::{CodecError, CodecResult};
use crate::{Container, KeyShardRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ward_crypto::{EncryptedPayload, FINGERPRINT_SIZE};
use ward_types::{SessionId, StreamId, TimeRange};

/// Latest container format version; the encoder always writes this.
pub const FORMAT_VERSION: u16 = 2;

const MAGIC: &[u8; 4] = b"WARD";
const HEADER_SIZE: usize = 4 + 2 + 4;
const SEAL_SIZE: usize = 32;

/// Version 2 body: current layout.
#[derive(Serialize, Deserialize)]
struct BodyV2 {
    session: SessionId,
    sequence: u64,
    stream: StreamId,
    range: TimeRange,
    payload: EncryptedPayload,
    shards: Vec<KeyShardRecord>,
    fingerprint: [u8; FINGERPRINT_SIZE],
}

/// Version 1 body: predates per-stream identifiers.
#[derive(Serialize, Deserialize)]
struct BodyV1 {
    session: SessionId,
    sequence: u64,
    range: TimeRange,
    payload: EncryptedPayload,
    shards: Vec<KeyShardRecord>,
    fingerprint: [u8; FINGERPRINT_SIZE],
}

fn serialize_body(container: &Container) -> CodecResult<Vec<u8>> {
    let body = BodyV2 {
        session: container.session,
        sequence: container.sequence,
        stream: container.stream.clone(),
        range: container.range,
        payload: container.payload.clone(),
        shards: container.shards.clone(),
        fingerprint: container.fingerprint,
    };
    bincode::serialize(&body).map_err(|e| CodecError::Format(format!("body serialize: {e}")))
}

fn frame_without_seal(container: &Container) -> CodecResult<Vec<u8>> {
    let body = serialize_body(container)?;
    let body_len = u32::try_from(body.len())
        .map_err(|_| CodecError::Format("container body exceeds u32 length".to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    frame.extend_from_slice(&body_len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Computes the structural seal over the container's encoded frame.
pub(crate) fn compute_seal(container: &Container) -> CodecResult<[u8; 32]> {
    let frame = frame_without_seal(container)?;
    let digest = Sha256::digest(&frame);
    let mut seal = [0u8; SEAL_SIZE];
    seal.copy_from_slice(&digest);
    Ok(seal)
}

/// Serializes a container to the versioned wire format. Deterministic: the
/// same container always encodes to the same bytes.
pub fn encode(container: &Container) -> CodecResult<Vec<u8>> {
    let mut frame = frame_without_seal(container)?;
    frame.extend_from_slice(&container.seal);
    Ok(frame)
}

/// Deserializes and verifies a container frame.
///
/// Distinguishes the three failure classes the store relies on:
/// [`CodecError::Truncation`] for short input (crash-interrupted writes),
/// [`CodecError::Format`] for structural problems, and
/// [`CodecError::Integrity`] when the embedded seal does not verify.
pub fn decode(bytes: &[u8]) -> CodecResult<Container> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::Truncation {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(CodecError::Format("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version == 0 || version > FORMAT_VERSION {
        return Err(CodecError::Format(format!("unknown format version {version}")));
    }

    let body_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let expected = HEADER_SIZE + body_len + SEAL_SIZE;
    if bytes.len() < expected {
        return Err(CodecError::Truncation {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(CodecError::Format(format!(
            "{} trailing bytes after frame",
            bytes.len() - expected
        )));
    }

    let sealed_region = &bytes[..HEADER_SIZE + body_len];
    let mut seal = [0u8; SEAL_SIZE];
    seal.copy_from_slice(&bytes[HEADER_SIZE + body_len..]);

    let digest = Sha256::digest(sealed_region);
    if digest.as_slice() != seal {
        return Err(CodecError::Integrity);
    }

    let body = &bytes[HEADER_SIZE..HEADER_SIZE + body_len];
    let container = match version {
        FORMAT_VERSION => {
            let body: BodyV2 = bincode::deserialize(body)
                .map_err(|e| CodecError::Format(format!("body deserialize: {e}")))?;
            Container {
                session: body.session,
                sequence: body.sequence,
                stream: body.stream,
                range: body.range,
                payload: body.payload,
                shards: body.shards,
                fingerprint: body.fingerprint,
                seal,
            }
        }
        1 => {
            let body: BodyV1 = bincode::deserialize(body)
                .map_err(|e| CodecError::Format(format!("v1 body deserialize: {e}")))?;
            Container {
                session: body.session,
                sequence: body.sequence,
                stream: StreamId::default(),
                range: body.range,
                payload: body.payload,
                shards: body.shards,
                fingerprint: body.fingerprint,
                seal,
            }
        }
        _ => unreachable!("version range checked above"),
    };

    Ok(container)
}
