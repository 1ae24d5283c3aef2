//! Workflow tests: weighted quorum, timeouts, denial reporting, tampering,
//! cancellation.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use ward_authorize::{
    AuthorityVerdict, AuthorizeError, DecryptionWorkflow, RequestState, WorkflowConfig,
};
use ward_container::Container;
use ward_crypto::EscrowKeyPair;
use ward_cryptainer::seal_chunk;
use ward_escrow::{EscrowAuthority, EscrowDirectory, LocalEscrowGateway, ReleasePolicy};
use ward_types::{AuthorityId, Chunk, RequestId, SessionId, StreamId, TimeRange};

struct Fixture {
    directory: Arc<EscrowDirectory>,
    gateway: Arc<LocalEscrowGateway>,
    container: Container,
}

/// Session with three authorities (weights 1, 1, 2) and one sealed chunk.
async fn fixture(payload: &[u8]) -> Fixture {
    let directory = Arc::new(EscrowDirectory::new());
    let gateway = Arc::new(LocalEscrowGateway::new());

    for (name, weight) in [("alpha", 1u32), ("bravo", 1), ("heavy", 2)] {
        let keypair = EscrowKeyPair::generate();
        directory
            .register(
                EscrowAuthority::new(name, keypair.public_bytes().to_vec()).with_weight(weight),
            )
            .unwrap();
        gateway
            .install(AuthorityId::from(name), keypair.secret, ReleasePolicy::Manual)
            .await;
    }

    let now = Utc::now();
    let chunk = Chunk::new(
        StreamId::new("cam-front"),
        payload.to_vec(),
        TimeRange::new(now, now),
    );
    let authorities = directory.active_authorities().unwrap();
    let container = seal_chunk(&chunk, SessionId::new(), 1, &authorities).unwrap();

    Fixture {
        directory,
        gateway,
        container,
    }
}

fn workflow(gateway: Arc<LocalEscrowGateway>, timeout: Duration) -> DecryptionWorkflow {
    DecryptionWorkflow::new(
        gateway,
        WorkflowConfig {
            per_authority_timeout: timeout,
        },
    )
}

fn ids(names: &[&str]) -> Vec<AuthorityId> {
    names.iter().map(|n| AuthorityId::from(*n)).collect()
}

async fn run(
    f: &Fixture,
    wf: &DecryptionWorkflow,
    subset: &[&str],
    quorum: u32,
) -> Result<ward_authorize::WorkflowReport, AuthorizeError> {
    let (_tx, rx) = watch::channel(false);
    wf.execute(
        RequestId::new(),
        f.container.clone(),
        ids(subset),
        quorum,
        Arc::clone(&f.directory),
        rx,
    )
    .await
}

#[tokio::test]
async fn heavy_authority_alone_meets_weighted_quorum() {
    let f = fixture(b"hello-witness").await;
    f.gateway.grant(&AuthorityId::from("heavy")).await;

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));
    let report = run(&f, &wf, &["alpha", "bravo", "heavy"], 2).await.unwrap();

    assert_eq!(report.state, RequestState::Decrypted);
    assert_eq!(report.plaintext.as_deref(), Some(b"hello-witness".as_slice()));
}

#[tokio::test]
async fn two_light_authorities_meet_same_quorum() {
    let f = fixture(b"hello-witness").await;
    f.gateway.deny(&AuthorityId::from("heavy"), "refused").await;
    f.gateway.grant(&AuthorityId::from("alpha")).await;
    f.gateway.grant(&AuthorityId::from("bravo")).await;

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));
    let report = run(&f, &wf, &["alpha", "bravo", "heavy"], 2).await.unwrap();

    assert_eq!(report.state, RequestState::Decrypted);
    assert_eq!(report.plaintext.as_deref(), Some(b"hello-witness".as_slice()));
}

#[tokio::test]
async fn quorum_met_despite_third_authority_timing_out() {
    let f = fixture(b"payload").await;
    f.gateway.grant(&AuthorityId::from("alpha")).await;
    f.gateway.grant(&AuthorityId::from("bravo")).await;
    // Heavy never answers within the timeout.
    f.gateway
        .set_latency(&AuthorityId::from("heavy"), Duration::from_secs(60))
        .await;
    f.gateway.grant(&AuthorityId::from("heavy")).await;

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_millis(200));
    let report = run(&f, &wf, &["alpha", "bravo", "heavy"], 2).await.unwrap();

    assert_eq!(report.state, RequestState::Decrypted);
    assert!(report.plaintext.is_some());
}

#[tokio::test]
async fn denial_report_names_every_failed_authority() {
    let f = fixture(b"payload").await;
    f.gateway.grant(&AuthorityId::from("alpha")).await;
    f.gateway.deny(&AuthorityId::from("bravo"), "operator refused").await;
    f.gateway
        .set_latency(&AuthorityId::from("heavy"), Duration::from_secs(60))
        .await;

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_millis(200));
    // Quorum 4 is unreachable with only alpha approving.
    let report = run(&f, &wf, &["alpha", "bravo", "heavy"], 4).await.unwrap();

    assert_eq!(report.state, RequestState::Denied);
    assert!(report.plaintext.is_none());
    assert_eq!(report.outcomes.len(), 3);

    let verdict = |name: &str| {
        report
            .outcomes
            .iter()
            .find(|o| o.authority.as_str() == name)
            .map(|o| o.verdict.clone())
            .unwrap()
    };
    assert_eq!(verdict("alpha"), AuthorityVerdict::Approved);
    assert!(matches!(verdict("bravo"), AuthorityVerdict::Denied(ref r) if r == "operator refused"));
    assert_eq!(verdict("heavy"), AuthorityVerdict::TimedOut);
}

#[tokio::test]
async fn tampered_ciphertext_is_reported_as_tampering_not_denial() {
    let mut f = fixture(b"payload").await;
    f.gateway.grant(&AuthorityId::from("heavy")).await;

    // Corrupt one ciphertext byte, then re-seal the container structure so
    // the codec-level check passes and tampering is only visible after
    // unseal.
    f.container.payload.ciphertext[0] ^= 0x01;
    f.container = f.container.clone().sealed().unwrap();

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));
    let report = run(&f, &wf, &["heavy"], 2).await.unwrap();

    assert_eq!(report.state, RequestState::Rejected);
    assert!(report.plaintext.is_none());
    // The approvals that led to quorum stay visible in the report.
    assert!(report
        .outcomes
        .iter()
        .any(|o| o.authority.as_str() == "heavy" && o.verdict == AuthorityVerdict::Approved));
}

#[tokio::test]
async fn cancellation_discards_partial_approvals() {
    let f = fixture(b"payload").await;
    f.gateway.grant(&AuthorityId::from("alpha")).await;
    f.gateway.grant(&AuthorityId::from("bravo")).await;
    f.gateway
        .set_latency(&AuthorityId::from("alpha"), Duration::from_millis(100))
        .await;
    f.gateway
        .set_latency(&AuthorityId::from("bravo"), Duration::from_secs(60))
        .await;

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(120));
    let (handle, task) = wf.begin(
        f.container.clone(),
        ids(&["alpha", "bravo"]),
        2,
        Arc::clone(&f.directory),
    );

    // Let alpha's approval arrive, then cancel before bravo can respond.
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.cancel();

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.state, RequestState::Cancelled);
    assert!(report.outcomes.is_empty(), "partial approvals must be discarded");
    assert!(report.plaintext.is_none());
}

#[tokio::test]
async fn unknown_authority_in_subset_fails_fast() {
    let f = fixture(b"payload").await;
    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));

    let err = run(&f, &wf, &["ghost"], 1).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::Escrow(_)));
}

#[tokio::test]
async fn authority_without_shard_fails_fast() {
    let f = fixture(b"payload").await;
    // Register a fourth authority after the container was sealed; it has no
    // shard in the container.
    let late = EscrowKeyPair::generate();
    f.directory
        .register(EscrowAuthority::new("late", late.public_bytes().to_vec()))
        .unwrap();

    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));
    let err = run(&f, &wf, &["late"], 1).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::ShardMissing(id) if id.as_str() == "late"));
}

#[tokio::test]
async fn zero_quorum_is_rejected() {
    let f = fixture(b"payload").await;
    let wf = workflow(Arc::clone(&f.gateway), Duration::from_secs(5));
    let err = run(&f, &wf, &["alpha"], 0).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::InvalidQuorum));
}
