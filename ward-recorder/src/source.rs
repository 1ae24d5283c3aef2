//! Frame source abstraction.
//!
//! Device capture (camera, microphone, GPS) lives outside the core; the
//! orchestrator pulls raw frames through this trait and owns chunking,
//! sealing and storage from there.

use crate::error::RecorderResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use ward_types::StreamId;

/// One raw sensor frame.
pub struct Frame {
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(data: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self { data, captured_at }
    }
}

// Raw frame bytes stay out of logs, like `Chunk`.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Async pull source of raw frames for one sensor stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Stream identifier recorded into every container cut from this source.
    fn stream(&self) -> StreamId {
        StreamId::default()
    }

    /// Next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> RecorderResult<Option<Frame>>;
}
