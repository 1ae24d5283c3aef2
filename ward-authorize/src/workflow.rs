//! The per-request state machine and its concurrent authority fan-out.

use crate::error::{AuthorizeError, AuthorizeResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ward_container::Container;
use ward_crypto::{decrypt_chunk, fingerprint, ChunkKey};
use ward_escrow::{EscrowDirectory, EscrowGateway, UnsealOutcome, UnsealRequest};
use ward_types::{AuthorityId, RequestId};
use zeroize::Zeroize;

/// Workflow tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Per-authority unseal timeout. A slow authority past this point counts
    /// as timed out; it never delays quorum from the others.
    pub per_authority_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            per_authority_timeout: Duration::from_secs(30),
        }
    }
}

/// States of one decryption request. `Decrypted`, `Denied`, `Rejected` and
/// `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Requested,
    AwaitingApprovals,
    QuorumMet,
    Decrypted,
    Denied,
    Rejected,
    Cancelled,
}

/// One authority's resolved verdict on a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorityVerdict {
    Approved,
    Denied(String),
    TimedOut,
    /// The gateway call itself failed (transport, unknown authority).
    Failed(String),
}

/// Per-authority result, reported so the operator can see exactly which
/// approvals are missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityOutcome {
    pub authority: AuthorityId,
    pub weight: u32,
    pub verdict: AuthorityVerdict,
}

/// Terminal report of one decryption request.
#[derive(Debug)]
pub struct WorkflowReport {
    pub request: RequestId,
    pub state: RequestState,
    /// Verdicts received before the request terminated. Empty when the
    /// request was cancelled (partial approvals are discarded).
    pub outcomes: Vec<AuthorityOutcome>,
    /// The decrypted chunk, present only in the `Decrypted` state.
    pub plaintext: Option<Vec<u8>>,
}

impl WorkflowReport {
    pub fn is_decrypted(&self) -> bool {
        self.state == RequestState::Decrypted
    }
}

/// Handle for cancelling an in-flight request.
#[derive(Clone)]
pub struct RequestHandle {
    request: RequestId,
    cancel_tx: watch::Sender<bool>,
}

impl RequestHandle {
    pub fn request_id(&self) -> RequestId {
        self.request
    }

    /// Cooperative cancellation: outstanding authority queries are not
    /// killed, but their results are discarded on arrival.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Runs decryption authorization requests against an escrow gateway.
#[derive(Clone)]
pub struct DecryptionWorkflow {
    gateway: Arc<dyn EscrowGateway>,
    config: WorkflowConfig,
}

struct AuthorityReply {
    authority: AuthorityId,
    weight: u32,
    result: Result<ward_escrow::EscrowResult<UnsealOutcome>, tokio::time::error::Elapsed>,
}

impl DecryptionWorkflow {
    pub fn new(gateway: Arc<dyn EscrowGateway>, config: WorkflowConfig) -> Self {
        Self { gateway, config }
    }

    /// Spawns a request and returns its cancellation handle plus the task
    /// producing the terminal report.
    pub fn begin(
        &self,
        container: Container,
        authorities: Vec<AuthorityId>,
        quorum: u32,
        directory: Arc<EscrowDirectory>,
    ) -> (RequestHandle, JoinHandle<AuthorizeResult<WorkflowReport>>) {
        let request = RequestId::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let workflow = self.clone();

        let task = tokio::spawn(async move {
            workflow
                .execute(request, container, authorities, quorum, directory, cancel_rx)
                .await
        });

        (
            RequestHandle {
                request,
                cancel_tx,
            },
            task,
        )
    }

    /// Drives one request to a terminal state.
    pub async fn execute(
        &self,
        request: RequestId,
        container: Container,
        authorities: Vec<AuthorityId>,
        quorum: u32,
        directory: Arc<EscrowDirectory>,
        mut cancel: watch::Receiver<bool>,
    ) -> AuthorizeResult<WorkflowReport> {
        // Requested: validate the target set against directory and container.
        if authorities.is_empty() {
            return Err(AuthorizeError::NoAuthorities);
        }
        if quorum == 0 {
            return Err(AuthorizeError::InvalidQuorum);
        }

        let mut queries = Vec::with_capacity(authorities.len());
        for id in &authorities {
            let authority = directory.resolve(id)?;
            let shard = container
                .shard_for(id)
                .ok_or_else(|| AuthorizeError::ShardMissing(id.clone()))?;
            queries.push((authority, shard.clone()));
        }

        info!(
            request = %request,
            container = %container.container_ref(),
            authorities = authorities.len(),
            quorum,
            "decryption request awaiting approvals"
        );

        // AwaitingApprovals: independent concurrent queries, each under its
        // own timeout.
        let (tx, mut rx) = mpsc::channel::<AuthorityReply>(queries.len());
        for (authority, shard) in queries {
            let gateway = Arc::clone(&self.gateway);
            let tx = tx.clone();
            let timeout = self.config.per_authority_timeout;
            let unseal_request = UnsealRequest {
                authority: authority.id.clone(),
                shard: shard.sealed_key,
                key_fingerprint: shard.key_fingerprint,
                recorded_at: container.range.end,
            };
            tokio::spawn(async move {
                let result =
                    tokio::time::timeout(timeout, gateway.unseal(unseal_request)).await;
                let _ = tx
                    .send(AuthorityReply {
                        authority: authority.id,
                        weight: authority.weight,
                        result,
                    })
                    .await;
            });
        }
        drop(tx);

        let cancel_wait = async {
            loop {
                if cancel.changed().await.is_err() {
                    // Handle dropped without cancelling; stay pending.
                    std::future::pending::<()>().await;
                }
                if *cancel.borrow() {
                    return;
                }
            }
        };
        tokio::pin!(cancel_wait);

        let mut outcomes: Vec<AuthorityOutcome> = Vec::new();
        let mut recovered: Option<Vec<u8>> = None;
        let mut approved_weight: u32 = 0;
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = &mut cancel_wait => {
                    cancelled = true;
                    break;
                }
                reply = rx.recv() => {
                    let Some(reply) = reply else { break };
                    let verdict = match reply.result {
                        Err(_) => {
                            warn!(request = %request, authority = %reply.authority, "authority timed out");
                            AuthorityVerdict::TimedOut
                        }
                        Ok(Err(e)) => {
                            warn!(request = %request, authority = %reply.authority, error = %e, "gateway call failed");
                            AuthorityVerdict::Failed(e.to_string())
                        }
                        Ok(Ok(UnsealOutcome::Denied { reason })) => {
                            debug!(request = %request, authority = %reply.authority, %reason, "approval denied");
                            AuthorityVerdict::Denied(reason)
                        }
                        Ok(Ok(UnsealOutcome::Approved(key))) => {
                            approved_weight += reply.weight;
                            // Every shard seals the same key; keep the first.
                            if recovered.is_none() {
                                recovered = Some(key);
                            }
                            debug!(
                                request = %request,
                                authority = %reply.authority,
                                approved_weight,
                                "approval received"
                            );
                            AuthorityVerdict::Approved
                        }
                    };
                    outcomes.push(AuthorityOutcome {
                        authority: reply.authority,
                        weight: reply.weight,
                        verdict,
                    });
                    if approved_weight >= quorum {
                        break;
                    }
                }
            }
        }

        if cancelled {
            // Discard everything collected so far; no side effects persist.
            if let Some(mut key) = recovered {
                key.zeroize();
            }
            info!(request = %request, "decryption request cancelled");
            return Ok(WorkflowReport {
                request,
                state: RequestState::Cancelled,
                outcomes: Vec::new(),
                plaintext: None,
            });
        }

        if approved_weight < quorum {
            info!(
                request = %request,
                approved_weight,
                quorum,
                "quorum unreachable, request denied"
            );
            if let Some(mut key) = recovered {
                key.zeroize();
            }
            return Ok(WorkflowReport {
                request,
                state: RequestState::Denied,
                outcomes,
                plaintext: None,
            });
        }

        // QuorumMet: recover the key and decrypt.
        let mut key_bytes = recovered.unwrap_or_default();
        let key = ChunkKey::from_bytes(&key_bytes).map_err(|e| {
            key_bytes.zeroize();
            AuthorizeError::KeyReconstruction(e.to_string())
        })?;
        key_bytes.zeroize();

        // With a quorum-approved key, a decryption failure is tampering, not
        // a wrong key. The request terminates in `Rejected`, distinct from a
        // routine denial, and keeps the verdicts that led to quorum.
        let mut plaintext = match decrypt_chunk(&key, &container.payload) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                warn!(request = %request, "payload failed authentication after quorum unseal");
                return Ok(WorkflowReport {
                    request,
                    state: RequestState::Rejected,
                    outcomes,
                    plaintext: None,
                });
            }
        };

        if fingerprint(&plaintext) != container.fingerprint {
            warn!(request = %request, "plaintext fingerprint mismatch");
            plaintext.zeroize();
            return Ok(WorkflowReport {
                request,
                state: RequestState::Rejected,
                outcomes,
                plaintext: None,
            });
        }

        info!(
            request = %request,
            approved_weight,
            bytes = plaintext.len(),
            "decryption request completed"
        );

        Ok(WorkflowReport {
            request,
            state: RequestState::Decrypted,
            outcomes,
            plaintext: Some(plaintext),
        })
    }
}
