//! Capture orchestration and the operator surface for Witness Ward.
//!
//! This crate ties the lower layers together: it cuts chunks from a frame
//! source, seals them through the cryptainer builder, appends them to the
//! durable store in strict sequence order, and exposes the session and
//! decryption-request operations an operator drives.

mod config;
mod error;
mod orchestrator;
mod service;
mod source;

pub use config::RecorderConfig;
pub use error::{RecorderError, RecorderResult};
pub use orchestrator::{run_session, SessionReport};
pub use service::{SessionStatus, WitnessService};
pub use source::{Frame, FrameSource};

/// Installs the process-wide tracing subscriber, honoring `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
