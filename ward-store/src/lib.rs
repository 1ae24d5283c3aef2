//! Crash-safe durable store for sealed containers.
//!
//! Layout: one directory per recording session, containers named by
//! zero-padded sequence index so lexical order equals logical order:
//!
//! ```text
//! root/
//!   <session-uuid>/
//!     00000001.crypt
//!     00000002.crypt
//!     index.json        # append-only supersede entries
//! ```
//!
//! Every append goes through write-temp, fsync, atomic rename, directory
//! fsync. A concurrent reader can never observe a half-written container: a
//! crash leaves at most a `.tmp` file, which scans ignore. Within one
//! session the orchestrator is the single writer, so published sequence
//! indices are monotonic and gap-free; gaps appear only across crash
//! boundaries and are reported by [`RecordingStore::scan_session`], never
//! hidden.

mod error;
mod index;

pub use error::{StoreError, StoreResult};
pub use index::SupersedeEntry;

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use ward_container::{decode, Container};
use ward_types::{ContainerRef, SequenceGap, SessionId};

const CONTAINER_EXT: &str = "crypt";

/// Store tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Retry budget for transient I/O failures during append.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub backoff_cap: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

/// A container that failed to decode during a scan.
#[derive(Clone, Debug)]
pub struct CorruptContainer {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of enumerating one session.
#[derive(Debug, Default)]
pub struct SessionScan {
    /// Successfully decoded containers in sequence order.
    pub containers: Vec<Container>,
    /// Containers skipped because they failed to decode.
    pub corrupt: Vec<CorruptContainer>,
    /// Holes in the published sequence (crash boundaries).
    pub gaps: Vec<SequenceGap>,
    /// Sequence indices superseded by later corrections.
    pub superseded: Vec<u64>,
}

/// Durable, append-only container store rooted at one directory.
pub struct RecordingStore {
    root: PathBuf,
    config: StoreConfig,
}

impl RecordingStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: SessionId) -> PathBuf {
        self.root.join(session.to_string())
    }

    fn container_path(&self, r: &ContainerRef) -> PathBuf {
        self.session_dir(r.session)
            .join(format!("{:08}.{CONTAINER_EXT}", r.sequence))
    }

    /// Appends one container, publishing it atomically.
    ///
    /// ENOSPC surfaces immediately as [`StoreError::StorageFull`]; other I/O
    /// failures are retried with exponential backoff up to the configured
    /// budget, then escalated.
    pub async fn append(&self, container: &Container) -> StoreResult<PathBuf> {
        let bytes = container.encode()?;
        let r = container.container_ref();
        let dir = self.session_dir(r.session);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| self.classify(e, &dir))?;

        let final_path = self.container_path(&r);
        if tokio::fs::try_exists(&final_path).await? {
            return Err(StoreError::DuplicateSequence(r));
        }
        let tmp_path = dir.join(format!(".{:08}.{CONTAINER_EXT}.tmp", r.sequence));

        let mut attempt: u32 = 0;
        loop {
            match write_atomic(&dir, &tmp_path, &final_path, &bytes).await {
                Ok(()) => {
                    debug!(container = %r, bytes = bytes.len(), "container published");
                    return Ok(final_path);
                }
                Err(e) => {
                    // Whatever happened, the unpublished temp must not linger.
                    let _ = tokio::fs::remove_file(&tmp_path).await;

                    if is_disk_full(&e) {
                        return Err(StoreError::StorageFull { path: final_path });
                    }

                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        container = %r,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient append failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_base
            .saturating_mul(1u32 << (attempt - 1).min(16));
        exp.min(self.config.backoff_cap)
    }

    fn classify(&self, e: std::io::Error, path: &Path) -> StoreError {
        if is_disk_full(&e) {
            StoreError::StorageFull {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io(e)
        }
    }

    /// Reads and decodes one container.
    pub async fn read(&self, r: &ContainerRef) -> StoreResult<Container> {
        let path = self.container_path(r);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*r));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(decode(&bytes)?)
    }

    /// Lists every session directory in the store, oldest first.
    pub async fn list_sessions(&self) -> StoreResult<Vec<SessionId>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(SessionId::parse) {
                Some(session) => sessions.push(session),
                None => debug!(name = ?name, "ignoring non-session directory"),
            }
        }
        // v7 ids sort chronologically
        sessions.sort();
        Ok(sessions)
    }

    /// Enumerates one session, skipping (and reporting) corrupt containers
    /// and reporting sequence gaps. A single bad file never hides the rest
    /// of the recordings.
    pub async fn scan_session(&self, session: SessionId) -> StoreResult<SessionScan> {
        let dir = self.session_dir(session);
        let mut found: Vec<(u64, PathBuf)> = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Only `NNNNNNNN.crypt`; temp files and the index are not
            // published containers.
            let Some(stem) = name.strip_suffix(".crypt") else { continue };
            if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let Ok(sequence) = stem.parse::<u64>() else { continue };
            found.push((sequence, entry.path()));
        }
        found.sort_by_key(|(seq, _)| *seq);

        let mut scan = SessionScan::default();
        let mut previous: Option<u64> = None;
        for (sequence, path) in found {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable container");
                    scan.corrupt.push(CorruptContainer {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let container = match decode(&bytes) {
                Ok(container) => container,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping corrupt container");
                    scan.corrupt.push(CorruptContainer {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if container.sequence != sequence {
                warn!(
                    path = %path.display(),
                    embedded = container.sequence,
                    "skipping container whose embedded sequence disagrees with its filename"
                );
                scan.corrupt.push(CorruptContainer {
                    path,
                    reason: format!("embedded sequence {} under filename {sequence}", container.sequence),
                });
                continue;
            }

            let expected = previous.map(|p| p + 1).unwrap_or(1);
            if sequence > expected {
                scan.gaps.push(SequenceGap {
                    expected,
                    found: sequence,
                });
            }
            previous = Some(sequence);
            scan.containers.push(container);
        }

        scan.superseded = index::load(&dir)
            .await?
            .into_iter()
            .map(|e| e.old_sequence)
            .collect();

        if !scan.gaps.is_empty() || !scan.corrupt.is_empty() {
            info!(
                session = %session,
                containers = scan.containers.len(),
                corrupt = scan.corrupt.len(),
                gaps = scan.gaps.len(),
                "session scan found anomalies"
            );
        }
        Ok(scan)
    }

    /// Records that `old_sequence` is superseded by `new_sequence`.
    /// Containers are never edited in place; corrections append a new
    /// container and mark the old one here.
    pub async fn mark_superseded(
        &self,
        session: SessionId,
        old_sequence: u64,
        new_sequence: u64,
    ) -> StoreResult<()> {
        let old_ref = ContainerRef::new(session, old_sequence);
        let new_ref = ContainerRef::new(session, new_sequence);
        for r in [&old_ref, &new_ref] {
            if !tokio::fs::try_exists(self.container_path(r)).await? {
                return Err(StoreError::NotFound(*r));
            }
        }

        let dir = self.session_dir(session);
        let mut entries = index::load(&dir).await?;
        entries.push(SupersedeEntry {
            old_sequence,
            new_sequence,
            recorded_at: chrono::Utc::now(),
        });
        index::save(&dir, &entries).await?;
        info!(session = %session, old_sequence, new_sequence, "container marked superseded");
        Ok(())
    }
}

fn is_disk_full(e: &std::io::Error) -> bool {
    // ENOSPC / EDQUOT
    matches!(e.raw_os_error(), Some(28) | Some(122))
}

/// Write-temp, fsync, rename, fsync-dir. The rename is the publish point.
async fn write_atomic(
    dir: &Path,
    tmp_path: &Path,
    final_path: &Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp_path, final_path).await?;

    // Persist the rename itself.
    let dir_file = tokio::fs::File::open(dir).await?;
    dir_file.sync_all().await?;
    Ok(())
}
