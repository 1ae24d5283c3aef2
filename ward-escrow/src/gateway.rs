//! Unseal gateway: the protocol boundary between the core and authorities.
//!
//! The core never holds authority private keys; it asks a gateway to unseal
//! a shard and gets back either the chunk key or a denial. Transport (HTTP,
//! hardware token, operator console) lives behind the trait. The workflow
//! applies its own per-authority timeout around every call.

use crate::authority::ReleasePolicy;
use crate::error::{EscrowError, EscrowResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use ward_crypto::{fingerprint, open_shard, SealedShard, SecretKey, FINGERPRINT_SIZE};
use ward_types::AuthorityId;

/// One shard-unseal request sent to an authority.
#[derive(Clone, Debug)]
pub struct UnsealRequest {
    pub authority: AuthorityId,
    pub shard: SealedShard,
    /// Fingerprint of the public key the shard was sealed with; the
    /// authority refuses if it does not match its own key.
    pub key_fingerprint: [u8; FINGERPRINT_SIZE],
    /// When the container was recorded; delayed-release policies gate on it.
    pub recorded_at: DateTime<Utc>,
}

/// An authority's verdict on an unseal request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsealOutcome {
    /// The unsealed chunk key bytes.
    Approved(Vec<u8>),
    Denied { reason: String },
}

/// Abstract remote call to an escrow authority.
#[async_trait]
pub trait EscrowGateway: Send + Sync {
    /// Asks the authority to unseal one shard. An `Err` means the call
    /// itself failed (transport, unknown authority); a policy refusal is a
    /// normal `Denied` outcome.
    async fn unseal(&self, request: UnsealRequest) -> EscrowResult<UnsealOutcome>;
}

struct LocalAuthority {
    secret: SecretKey,
    policy: ReleasePolicy,
    granted: bool,
    denial: Option<String>,
    latency: Option<Duration>,
}

/// In-process gateway holding authority secret keys.
///
/// Backs local authorities (e.g. an operator-held key device) and tests.
/// Manual-policy authorities approve only after an explicit
/// [`LocalEscrowGateway::grant`]; delayed-release authorities approve once
/// the recording is old enough.
pub struct LocalEscrowGateway {
    authorities: RwLock<HashMap<AuthorityId, LocalAuthority>>,
}

impl LocalEscrowGateway {
    pub fn new() -> Self {
        Self {
            authorities: RwLock::new(HashMap::new()),
        }
    }

    /// Installs an authority's secret key and release policy.
    pub async fn install(&self, id: AuthorityId, secret: SecretKey, policy: ReleasePolicy) {
        self.authorities.write().await.insert(
            id,
            LocalAuthority {
                secret,
                policy,
                granted: false,
                denial: None,
                latency: None,
            },
        );
    }

    /// Records operator approval for a manual-policy authority.
    pub async fn grant(&self, id: &AuthorityId) {
        if let Some(a) = self.authorities.write().await.get_mut(id) {
            a.granted = true;
            a.denial = None;
        }
    }

    /// Forces the authority to deny every request with the given reason.
    pub async fn deny(&self, id: &AuthorityId, reason: impl Into<String>) {
        if let Some(a) = self.authorities.write().await.get_mut(id) {
            a.granted = false;
            a.denial = Some(reason.into());
        }
    }

    /// Adds artificial response latency, for exercising workflow timeouts.
    pub async fn set_latency(&self, id: &AuthorityId, latency: Duration) {
        if let Some(a) = self.authorities.write().await.get_mut(id) {
            a.latency = Some(latency);
        }
    }
}

impl Default for LocalEscrowGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EscrowGateway for LocalEscrowGateway {
    async fn unseal(&self, request: UnsealRequest) -> EscrowResult<UnsealOutcome> {
        let latency = {
            let map = self.authorities.read().await;
            map.get(&request.authority).and_then(|a| a.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let map = self.authorities.read().await;
        let authority = map
            .get(&request.authority)
            .ok_or_else(|| EscrowError::UnknownAuthority(request.authority.clone()))?;

        if let Some(reason) = &authority.denial {
            debug!(authority = %request.authority, %reason, "unseal denied");
            return Ok(UnsealOutcome::Denied {
                reason: reason.clone(),
            });
        }

        // The shard must have been sealed with this authority's current key.
        let own_fingerprint = fingerprint(authority.secret.public_key().as_bytes());
        if own_fingerprint != request.key_fingerprint {
            return Ok(UnsealOutcome::Denied {
                reason: "key fingerprint mismatch".to_string(),
            });
        }

        match &authority.policy {
            ReleasePolicy::Manual => {
                if !authority.granted {
                    return Ok(UnsealOutcome::Denied {
                        reason: "approval not granted".to_string(),
                    });
                }
            }
            ReleasePolicy::DelayedAutoRelease { delay } => {
                let delay =
                    chrono::Duration::from_std(*delay).unwrap_or(chrono::Duration::MAX);
                if Utc::now() < request.recorded_at + delay {
                    return Ok(UnsealOutcome::Denied {
                        reason: "release delay not elapsed".to_string(),
                    });
                }
            }
        }

        // Fingerprint matched but the shard will not open: the shard record
        // is damaged, which is a gateway failure rather than a policy denial.
        match open_shard(&request.shard, &authority.secret) {
            Ok(key) => {
                debug!(authority = %request.authority, "shard unsealed");
                Ok(UnsealOutcome::Approved(key))
            }
            Err(e) => Err(EscrowError::Gateway {
                authority: request.authority.clone(),
                reason: format!("shard unseal failed: {e}"),
            }),
        }
    }
}
