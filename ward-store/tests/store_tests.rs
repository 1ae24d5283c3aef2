//! Durable store tests: atomic publish, corrupt-skip, gap reporting,
//! supersede index, and crash simulation.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use ward_container::{Container, KeyShardRecord};
use ward_crypto::{EncryptedPayload, SealedShard};
use ward_store::{RecordingStore, StoreConfig, StoreError};
use ward_types::{AuthorityId, ContainerRef, SequenceGap, SessionId, StreamId, TimeRange};

fn container(session: SessionId, sequence: u64, payload: &[u8]) -> Container {
    let now = Utc::now();
    Container {
        session,
        sequence,
        stream: StreamId::new("cam-front"),
        range: TimeRange::new(now, now),
        payload: EncryptedPayload {
            nonce: [0u8; 12],
            ciphertext: payload.to_vec(),
        },
        shards: vec![KeyShardRecord {
            authority: AuthorityId::from("notary-alpha"),
            key_fingerprint: [1u8; 32],
            sealed_key: SealedShard {
                ephemeral_public_key: [2u8; 32],
                nonce: [3u8; 24],
                ciphertext: vec![4u8; 48],
            },
        }],
        fingerprint: [5u8; 32],
        seal: [0u8; 32],
    }
    .sealed()
    .unwrap()
}

fn store(dir: &TempDir) -> RecordingStore {
    RecordingStore::open(dir.path(), StoreConfig::default()).unwrap()
}

#[tokio::test]
async fn append_then_read_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    let c = container(session, 1, b"payload");

    let path = store.append(&c).await.unwrap();
    assert!(path.ends_with(format!("{session}/00000001.crypt")));

    let read = store.read(&ContainerRef::new(session, 1)).await.unwrap();
    assert_eq!(read, c);
}

#[tokio::test]
async fn duplicate_sequence_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();

    store.append(&container(session, 1, b"a")).await.unwrap();
    let err = store.append(&container(session, 1, b"b")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateSequence(r) if r.sequence == 1));

    // The original is untouched.
    let read = store.read(&ContainerRef::new(session, 1)).await.unwrap();
    assert_eq!(read.payload.ciphertext, b"a".to_vec());
}

#[tokio::test]
async fn read_missing_container_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    store.append(&container(session, 1, b"a")).await.unwrap();

    let err = store.read(&ContainerRef::new(session, 2)).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn scan_skips_corrupt_containers_and_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();

    store.append(&container(session, 1, b"one")).await.unwrap();
    store.append(&container(session, 2, b"two")).await.unwrap();
    store.append(&container(session, 3, b"three")).await.unwrap();

    // Corrupt the middle container on disk.
    let path = dir.path().join(session.to_string()).join("00000002.crypt");
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[20] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let scan = store.scan_session(session).await.unwrap();
    let sequences: Vec<u64> = scan.containers.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![1, 3], "one corrupt file must not hide the rest");
    assert_eq!(scan.corrupt.len(), 1);
    assert!(scan.corrupt[0].path.ends_with("00000002.crypt"));
    // The corrupt slot surfaces as a sequence gap, not silently.
    assert_eq!(scan.gaps, vec![SequenceGap { expected: 2, found: 3 }]);
}

#[tokio::test]
async fn scan_reports_gaps_from_crash_boundaries() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();

    for seq in [2u64, 3, 7] {
        store.append(&container(session, seq, b"x")).await.unwrap();
    }

    let scan = store.scan_session(session).await.unwrap();
    assert_eq!(
        scan.gaps,
        vec![
            SequenceGap { expected: 1, found: 2 },
            SequenceGap { expected: 4, found: 7 },
        ]
    );
}

#[tokio::test]
async fn leftover_temp_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    store.append(&container(session, 1, b"good")).await.unwrap();

    // A crash between write and rename leaves a temp file behind.
    let session_dir = dir.path().join(session.to_string());
    std::fs::write(session_dir.join(".00000002.crypt.tmp"), b"half written").unwrap();

    let scan = store.scan_session(session).await.unwrap();
    assert_eq!(scan.containers.len(), 1);
    assert!(scan.corrupt.is_empty(), "temp files are not corrupt containers");
}

#[tokio::test]
async fn filename_and_embedded_sequence_must_agree() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    store.append(&container(session, 1, b"good")).await.unwrap();

    // Copy container 1's bytes under the wrong name.
    let session_dir = dir.path().join(session.to_string());
    std::fs::copy(
        session_dir.join("00000001.crypt"),
        session_dir.join("00000005.crypt"),
    )
    .unwrap();

    let scan = store.scan_session(session).await.unwrap();
    assert_eq!(scan.containers.len(), 1);
    assert_eq!(scan.corrupt.len(), 1);
    assert!(scan.corrupt[0].reason.contains("sequence"));
}

#[tokio::test]
async fn list_sessions_ignores_stray_entries() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let a = SessionId::new();
    let b = SessionId::new();
    store.append(&container(a, 1, b"x")).await.unwrap();
    store.append(&container(b, 1, b"y")).await.unwrap();

    std::fs::create_dir(dir.path().join("not-a-session")).unwrap();
    std::fs::write(dir.path().join("stray.txt"), b"noise").unwrap();

    let sessions = store.list_sessions().await.unwrap();
    assert_eq!(sessions, vec![a, b], "v7 ids must list oldest first");
}

#[tokio::test]
async fn supersede_marks_are_recorded_and_scanned() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    store.append(&container(session, 1, b"bad take")).await.unwrap();
    store.append(&container(session, 2, b"correction")).await.unwrap();

    store.mark_superseded(session, 1, 2).await.unwrap();

    let scan = store.scan_session(session).await.unwrap();
    assert_eq!(scan.superseded, vec![1]);
    // Both containers still exist; nothing was edited in place.
    assert_eq!(scan.containers.len(), 2);
}

#[tokio::test]
async fn superseding_a_missing_container_fails() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    store.append(&container(session, 1, b"only")).await.unwrap();

    let err = store.mark_superseded(session, 1, 9).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(r) if r.sequence == 9));
}

#[tokio::test]
async fn persistent_write_failure_exhausts_retries() {
    let dir = TempDir::new().unwrap();
    let store = RecordingStore::open(
        dir.path(),
        StoreConfig {
            max_retries: 2,
            backoff_base: std::time::Duration::from_millis(1),
            backoff_cap: std::time::Duration::from_millis(5),
        },
    )
    .unwrap();
    let session = SessionId::new();
    store.append(&container(session, 1, b"x")).await.unwrap();

    // Occupy the temp path with a directory so every write attempt fails.
    let session_dir = dir.path().join(session.to_string());
    std::fs::create_dir(session_dir.join(".00000002.crypt.tmp")).unwrap();

    let err = store.append(&container(session, 2, b"y")).await.unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { attempts: 3, .. }));
}

/// Appending under crash-at-random-points must never publish a duplicate or
/// out-of-order sequence index, and scans must never mistake debris for a
/// container.
#[tokio::test]
async fn crash_simulation_never_corrupts_published_sequence() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let session = SessionId::new();
    let session_dir = dir.path().join(session.to_string());

    let mut rng = StdRng::seed_from_u64(0x57A7E);
    let mut published: Vec<u64> = Vec::new();

    for sequence in 1..=1000u64 {
        let c = container(session, sequence, b"chunk");
        match rng.gen_range(0..10) {
            // Crash mid-write: a truncated temp file is all that survives.
            0 => {
                std::fs::create_dir_all(&session_dir).unwrap();
                let bytes = c.encode().unwrap();
                let cut = rng.gen_range(0..bytes.len());
                std::fs::write(
                    session_dir.join(format!(".{sequence:08}.crypt.tmp")),
                    &bytes[..cut],
                )
                .unwrap();
            }
            // Crash after write but before rename: full temp, unpublished.
            1 => {
                std::fs::create_dir_all(&session_dir).unwrap();
                std::fs::write(
                    session_dir.join(format!(".{sequence:08}.crypt.tmp")),
                    c.encode().unwrap(),
                )
                .unwrap();
            }
            // Normal append.
            _ => {
                store.append(&c).await.unwrap();
                published.push(sequence);
            }
        }
    }

    let scan = store.scan_session(session).await.unwrap();
    let scanned: Vec<u64> = scan.containers.iter().map(|c| c.sequence).collect();

    assert_eq!(scanned, published, "exactly the published containers, in order");
    assert!(scan.corrupt.is_empty(), "crash debris must never decode as a container");
    assert!(
        scanned.windows(2).all(|w| w[0] < w[1]),
        "published sequence must be strictly increasing"
    );
    // Every simulated crash before the newest published container is
    // visible as a gap.
    let last = *published.last().unwrap();
    let missing: Vec<u64> = (1..=last).filter(|s| !published.contains(s)).collect();
    let gap_count: u64 = scan
        .gaps
        .iter()
        .map(|g| g.found - g.expected)
        .sum();
    assert_eq!(gap_count as usize, missing.len());
}
