//! Shard sealing: envelope encryption of chunk keys for escrow authorities.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305. Each chunk key is sealed
//! with an authority's public key using an ephemeral keypair, so the sealed
//! record reveals nothing about the sealer and each seal is independent.

use crate::error::{CryptoError, CryptoResult};
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
pub use crypto_box::{PublicKey, SecretKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// XSalsa20 nonce size in bytes.
pub const SHARD_NONCE_SIZE: usize = 24;
/// X25519 key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 keypair held by an escrow authority.
///
/// The core only ever handles the public half; the secret half lives with
/// the authority (the local gateway keeps one for in-process authorities).
/// The secret key zeroizes on drop (from crypto_box).
pub struct EscrowKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl EscrowKeyPair {
    /// Generates a fresh authority keypair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// A chunk key sealed for one escrow authority.
///
/// The ephemeral public key is included so the authority can reconstruct the
/// shared secret when it later unseals the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedShard {
    /// Ephemeral X25519 public key (sealer side of DH).
    pub ephemeral_public_key: [u8; PUBLIC_KEY_SIZE],
    /// XSalsa20 nonce.
    pub nonce: [u8; SHARD_NONCE_SIZE],
    /// Encrypted chunk key (XSalsa20-Poly1305 ciphertext + tag).
    pub ciphertext: Vec<u8>,
}

/// Parses an authority public key from raw bytes.
pub fn parse_public_key(bytes: &[u8]) -> CryptoResult<PublicKey> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CryptoError::MalformedKey(format!(
            "expected {PUBLIC_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; PUBLIC_KEY_SIZE];
    buf.copy_from_slice(bytes);
    Ok(PublicKey::from(buf))
}

/// Seals a chunk key for one authority with a fresh ephemeral keypair.
pub fn seal_key(key: &[u8], authority_pk: &PublicKey) -> CryptoResult<SealedShard> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(authority_pk, &ephemeral);

    let mut nonce_bytes = [0u8; SHARD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), key)
        .map_err(|e| CryptoError::Encryption(format!("shard seal failed: {e}")))?;

    Ok(SealedShard {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed shard with the authority's secret key, recovering the
/// chunk key bytes.
pub fn open_shard(shard: &SealedShard, authority_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(shard.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, authority_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&shard.nonce),
            shard.ciphertext.as_ref(),
        )
        .map_err(|_| {
            CryptoError::Decryption("shard open failed (wrong key or tampered record)".to_string())
        })
}
