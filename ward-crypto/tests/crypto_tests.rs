//! Adversarial tests for the encryption layer.
//!
//! Validates that:
//! - Chunk payload encryption round-trips and rejects tampering
//! - Shard sealing round-trips and rejects the wrong authority key
//! - Tampered shard ciphertext / nonce / ephemeral key are detected
//! - Fingerprints are stable and collision-visible for distinct inputs

use proptest::prelude::*;
use ward_crypto::shard::parse_public_key;
use ward_crypto::{
    decrypt_chunk, encrypt_chunk, fingerprint, open_shard, seal_key, ChunkKey, CryptoError,
    EscrowKeyPair,
};

#[test]
fn chunk_payload_roundtrip() {
    let key = ChunkKey::generate();
    let plaintext = b"hello-witness";

    let payload = encrypt_chunk(&key, plaintext).unwrap();
    assert_ne!(payload.ciphertext, plaintext.to_vec());

    let recovered = decrypt_chunk(&key, &payload).unwrap();
    assert_eq!(recovered, plaintext);
}

#[test]
fn wrong_chunk_key_fails() {
    let key = ChunkKey::generate();
    let other = ChunkKey::generate();

    let payload = encrypt_chunk(&key, b"sensor data").unwrap();
    let err = decrypt_chunk(&other, &payload).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn tampered_chunk_ciphertext_detected() {
    let key = ChunkKey::generate();
    let mut payload = encrypt_chunk(&key, b"sensor data").unwrap();

    // Flip one byte anywhere in the ciphertext
    payload.ciphertext[3] ^= 0x01;

    let err = decrypt_chunk(&key, &payload).unwrap_err();
    assert!(
        matches!(err, CryptoError::Decryption(_)),
        "tampered ciphertext must fail authentication"
    );
}

#[test]
fn seal_and_open_shard_roundtrip() {
    let authority = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let shard = seal_key(key.as_bytes(), &authority.public).unwrap();
    let opened = open_shard(&shard, &authority.secret).unwrap();
    assert_eq!(opened.as_slice(), key.as_bytes());
}

#[test]
fn open_with_wrong_authority_key_fails() {
    let intended = EscrowKeyPair::generate();
    let wrong = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let shard = seal_key(key.as_bytes(), &intended.public).unwrap();
    let err = open_shard(&shard, &wrong.secret).unwrap_err();
    match err {
        CryptoError::Decryption(msg) => {
            assert!(
                msg.contains("wrong key") || msg.contains("tampered"),
                "should indicate wrong key or tampered record, got: {msg}"
            );
        }
        other => panic!("expected CryptoError::Decryption, got: {other:?}"),
    }
}

#[test]
fn tampered_shard_ciphertext_detected() {
    let authority = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let mut shard = seal_key(key.as_bytes(), &authority.public).unwrap();
    if let Some(byte) = shard.ciphertext.first_mut() {
        *byte ^= 0xFF;
    }

    let err = open_shard(&shard, &authority.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn tampered_shard_nonce_detected() {
    let authority = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let mut shard = seal_key(key.as_bytes(), &authority.public).unwrap();
    shard.nonce[0] ^= 0xFF;

    let err = open_shard(&shard, &authority.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn tampered_ephemeral_key_detected() {
    let authority = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let mut shard = seal_key(key.as_bytes(), &authority.public).unwrap();
    shard.ephemeral_public_key[0] ^= 0xFF;

    let err = open_shard(&shard, &authority.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn independent_seals_of_same_key_differ() {
    let authority = EscrowKeyPair::generate();
    let key = ChunkKey::generate();

    let a = seal_key(key.as_bytes(), &authority.public).unwrap();
    let b = seal_key(key.as_bytes(), &authority.public).unwrap();

    // Fresh ephemeral keypair and nonce per seal
    assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.ciphertext, b.ciphertext);

    // Both still open to the same key
    assert_eq!(
        open_shard(&a, &authority.secret).unwrap(),
        open_shard(&b, &authority.secret).unwrap()
    );
}

#[test]
fn parse_public_key_rejects_bad_length() {
    let err = parse_public_key(&[1u8; 31]).unwrap_err();
    assert!(matches!(err, CryptoError::MalformedKey(_)));
    assert!(parse_public_key(&[1u8; 32]).is_ok());
}

#[test]
fn fingerprint_is_stable_and_distinguishes_inputs() {
    let a = fingerprint(b"hello-witness");
    let b = fingerprint(b"hello-witness");
    let c = fingerprint(b"hello-witnesS");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

proptest! {
    #[test]
    fn chunk_roundtrip_for_arbitrary_payloads(
        plaintext in proptest::collection::vec(any::<u8>(), 0..4096)
    ) {
        let key = ChunkKey::generate();
        let payload = encrypt_chunk(&key, &plaintext).unwrap();
        prop_assert_eq!(decrypt_chunk(&key, &payload).unwrap(), plaintext);
    }

    #[test]
    fn sealed_shard_never_leaks_the_key(
        key_bytes in proptest::array::uniform32(any::<u8>())
    ) {
        let authority = EscrowKeyPair::generate();
        let shard = seal_key(&key_bytes, &authority.public).unwrap();
        // The sealed record must not contain the raw key anywhere.
        prop_assert!(shard
            .ciphertext
            .windows(key_bytes.len())
            .all(|w| w != key_bytes));
        prop_assert_eq!(open_shard(&shard, &authority.secret).unwrap(), key_bytes.to_vec());
    }
}
