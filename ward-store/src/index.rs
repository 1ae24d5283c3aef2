//! Per-session supersede index.
//!
//! Appending a correction never touches the original container file; the
//! index records which sequence indices have been replaced. Written with the
//! same temp-then-rename discipline as containers.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncWriteExt;

const INDEX_FILE: &str = "index.json";
const INDEX_TMP: &str = ".index.json.tmp";

/// One supersede record: `old_sequence` is replaced by `new_sequence`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersedeEntry {
    pub old_sequence: u64,
    pub new_sequence: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Loads a session's index; a missing file is an empty index.
pub(crate) async fn load(session_dir: &Path) -> StoreResult<Vec<SupersedeEntry>> {
    let path = session_dir.join(INDEX_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Index(e.to_string()))
}

/// Atomically rewrites a session's index.
pub(crate) async fn save(session_dir: &Path, entries: &[SupersedeEntry]) -> StoreResult<()> {
    let bytes =
        serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Index(e.to_string()))?;

    let tmp = session_dir.join(INDEX_TMP);
    let path = session_dir.join(INDEX_FILE);

    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        let dir_file = tokio::fs::File::open(session_dir).await?;
        dir_file.sync_all().await?;
        Ok(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result.map_err(StoreError::Io)
}
