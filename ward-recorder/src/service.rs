//! Operator-facing service surface.
//!
//! One [`WitnessService`] owns the directory, the store, the escrow gateway
//! and the decryption workflow, and exposes the operations an operator
//! console drives: start/stop a recording session, request decryption of a
//! stored container, cancel or await a request.

use crate::config::RecorderConfig;
use crate::error::{RecorderError, RecorderResult};
use crate::orchestrator::{run_session, SessionReport};
use crate::source::FrameSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;
use ward_authorize::{
    AuthorizeResult, DecryptionWorkflow, RequestHandle, WorkflowConfig, WorkflowReport,
};
use ward_escrow::{EscrowDirectory, EscrowGateway};
use ward_store::RecordingStore;
use ward_types::{AuthorityId, ContainerRef, RequestId, SessionId};

/// Whether a session is currently recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording { session: SessionId },
}

struct ActiveSession {
    session: SessionId,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<RecorderResult<SessionReport>>,
}

struct InFlightRequest {
    handle: RequestHandle,
    task: JoinHandle<AuthorizeResult<WorkflowReport>>,
}

/// The recording and decryption service. At most one session records at a
/// time; decryption requests run concurrently and independently.
pub struct WitnessService {
    directory: Arc<EscrowDirectory>,
    store: Arc<RecordingStore>,
    workflow: DecryptionWorkflow,
    config: RecorderConfig,
    active: Mutex<Option<ActiveSession>>,
    requests: Mutex<HashMap<RequestId, InFlightRequest>>,
}

impl WitnessService {
    pub fn new(
        directory: Arc<EscrowDirectory>,
        store: Arc<RecordingStore>,
        gateway: Arc<dyn EscrowGateway>,
        config: RecorderConfig,
        workflow_config: WorkflowConfig,
    ) -> Self {
        Self {
            directory,
            store,
            workflow: DecryptionWorkflow::new(gateway, workflow_config),
            config,
            active: Mutex::new(None),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a recording session bound to the given authorities.
    ///
    /// The authority set is snapshotted here and stays immutable for the
    /// session; directory changes affect future sessions only.
    pub async fn start_session<S>(
        &self,
        source: S,
        authority_ids: &[AuthorityId],
    ) -> RecorderResult<SessionId>
    where
        S: FrameSource + 'static,
    {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(RecorderError::SessionActive(current.session));
        }

        let mut snapshot = Vec::with_capacity(authority_ids.len());
        for id in authority_ids {
            let authority = self.directory.resolve(id)?;
            if !authority.active {
                return Err(RecorderError::InactiveAuthority(id.clone()));
            }
            snapshot.push(authority);
        }

        let session = SessionId::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            source,
            session,
            snapshot,
            Arc::clone(&self.store),
            self.config.clone(),
            stop_rx,
        ));

        info!(session = %session, authorities = authority_ids.len(), "session started");
        *active = Some(ActiveSession {
            session,
            stop_tx,
            task,
        });
        Ok(session)
    }

    /// Stops the active session and waits for the pipeline to drain.
    pub async fn stop_session(&self) -> RecorderResult<SessionReport> {
        let mut active = self.active.lock().await;
        let current = active.take().ok_or(RecorderError::NoActiveSession)?;
        drop(active);

        let _ = current.stop_tx.send(true);
        current
            .task
            .await
            .map_err(|e| RecorderError::Task(e.to_string()))?
    }

    pub async fn session_status(&self) -> SessionStatus {
        match self.active.lock().await.as_ref() {
            Some(current) => SessionStatus::Recording {
                session: current.session,
            },
            None => SessionStatus::Idle,
        }
    }

    /// Starts a decryption authorization request for one stored container.
    pub async fn request_decryption(
        &self,
        target: &ContainerRef,
        authority_ids: Vec<AuthorityId>,
        quorum: u32,
    ) -> RecorderResult<RequestId> {
        let container = self.store.read(target).await?;
        let (handle, task) =
            self.workflow
                .begin(container, authority_ids, quorum, Arc::clone(&self.directory));
        let request = handle.request_id();
        self.requests
            .lock()
            .await
            .insert(request, InFlightRequest { handle, task });
        info!(request = %request, container = %target, quorum, "decryption requested");
        Ok(request)
    }

    /// Cancels an in-flight request. Partial approvals are discarded; the
    /// request still terminates and can be awaited for its report.
    pub async fn cancel_request(&self, request: RequestId) -> RecorderResult<()> {
        let requests = self.requests.lock().await;
        let in_flight = requests
            .get(&request)
            .ok_or(RecorderError::UnknownRequest(request))?;
        in_flight.handle.cancel();
        Ok(())
    }

    /// Waits for a request's terminal report. Consumes the request; a second
    /// await of the same id fails as unknown.
    pub async fn await_request(&self, request: RequestId) -> RecorderResult<WorkflowReport> {
        let in_flight = self
            .requests
            .lock()
            .await
            .remove(&request)
            .ok_or(RecorderError::UnknownRequest(request))?;
        let report = in_flight
            .task
            .await
            .map_err(|e| RecorderError::Task(e.to_string()))??;
        Ok(report)
    }
}
