//! Recorder configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture pipeline tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Target wall-clock span of one chunk. A chunk is cut when the frames
    /// it holds span at least this long.
    pub chunk_duration: Duration,
    /// Size ceiling for one chunk; cuts early when reached so a dense
    /// stream cannot produce unboundedly large containers.
    pub max_chunk_bytes: usize,
    /// Bound on chunks queued between capture and sealing. When the queue
    /// is full the session fails with a capture overrun.
    pub queue_capacity: usize,
    /// Chunks sealed in parallel.
    pub seal_concurrency: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(60),
            max_chunk_bytes: 8 * 1024 * 1024,
            queue_capacity: 16,
            seal_concurrency: 2,
        }
    }
}
