//! Encryption layer for Witness Ward.
//!
//! Provides the primitives the capture pipeline is built from:
//! - ChaCha20-Poly1305 for authenticated chunk payload encryption
//! - X25519 + XSalsa20-Poly1305 envelope sealing of chunk keys per escrow
//!   authority (see [`shard`])
//! - SHA-256 fingerprints for plaintext authenticity and key identification
//! - Zeroized key material
//!
//! # Architecture
//!
//! Every chunk gets a fresh random symmetric key. The payload is encrypted
//! once with that key; the key itself is then sealed separately for each
//! escrow authority. Compromising one authority's approval therefore never
//! exposes any other chunk's key.

mod error;
pub mod shard;

pub use error::{CryptoError, CryptoResult};
pub use shard::{open_shard, seal_key, EscrowKeyPair, PublicKey, SealedShard, SecretKey};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (ChaCha20-Poly1305).
pub const KEY_SIZE: usize = 32;
/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// SHA-256 fingerprint size in bytes.
pub const FINGERPRINT_SIZE: usize = 32;

/// Per-chunk symmetric encryption key.
///
/// Generated fresh for every chunk, never reused, wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChunkKey([u8; KEY_SIZE]);

impl ChunkKey {
    /// Generates a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Reconstructs a key from raw bytes (e.g. an unsealed shard).
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; KEY_SIZE];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChunkKey(..)")
    }
}

/// Authenticated ciphertext of one chunk payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// ChaCha20-Poly1305 nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext plus Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    pub fn len(&self) -> usize {
        self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

/// Encrypts a chunk payload with a fresh nonce under the given key.
pub fn encrypt_chunk(key: &ChunkKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("bad key: {e}")))?;

    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("chunk encryption failed: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);

    Ok(EncryptedPayload {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts a chunk payload. Fails on any tampering (Poly1305 tag mismatch)
/// or wrong key.
pub fn decrypt_chunk(key: &ChunkKey, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Decryption(format!("bad key: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(&payload.nonce), payload.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("chunk decryption failed (wrong key or tampered data)".to_string())
        })
}

/// SHA-256 fingerprint of arbitrary bytes.
///
/// Used both for plaintext authenticity (stored in the container, re-checked
/// after decryption) and for identifying authority public keys in shard
/// records.
pub fn fingerprint(data: &[u8]) -> [u8; FINGERPRINT_SIZE] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; FINGERPRINT_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// Hex rendering of a fingerprint, for logs and diagnostics.
pub fn fingerprint_hex(fp: &[u8; FINGERPRINT_SIZE]) -> String {
    hex::encode(fp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_keys_are_unique() {
        let a = ChunkKey::generate();
        let b = ChunkKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = ChunkKey::from_bytes(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength { expected: 32, actual: 16 }
        ));
    }
}
