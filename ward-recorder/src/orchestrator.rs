//! Capture pipeline: frames in, sealed containers durably stored.
//!
//! Three stages connected by bounded channels:
//!
//! ```text
//! capture loop -> seal stage (parallel, semaphore-bounded) -> writer
//! ```
//!
//! Sealing is CPU-bound and runs on blocking threads, so chunks can finish
//! out of order; the writer holds a reorder buffer and appends strictly in
//! sequence order, which keeps the published store gap-free while the
//! process is alive. Backpressure is fail-loud: a full chunk queue ends the
//! session with a capture overrun instead of dropping or reordering chunks.
//!
//! Failure propagates backwards: a writer error drops its receiver, the
//! seal stage observes the closed channel and exits, and the capture loop
//! observes its own channel closing and stops immediately. A live source
//! never keeps capturing into a dead pipeline.

use crate::config::RecorderConfig;
use crate::error::{RecorderError, RecorderResult};
use crate::source::FrameSource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};
use ward_container::Container;
use ward_cryptainer::{seal_chunk, SealingError};
use ward_escrow::EscrowAuthority;
use ward_store::RecordingStore;
use ward_types::{Chunk, SessionId, TimeRange};
use zeroize::Zeroize;

/// Summary of one finished recording session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub session: SessionId,
    /// Containers published to the store.
    pub containers: u64,
    /// Raw bytes captured and sealed.
    pub raw_bytes: u64,
}

/// Runs one recording session to completion.
///
/// Ends when the source is exhausted, `stop` flips to true, or the pipeline
/// fails. The bound `authorities` snapshot is immutable for the whole
/// session: every container it produces carries one shard per authority.
pub async fn run_session<S: FrameSource>(
    mut source: S,
    session: SessionId,
    authorities: Vec<EscrowAuthority>,
    store: Arc<RecordingStore>,
    config: RecorderConfig,
    mut stop: watch::Receiver<bool>,
) -> RecorderResult<SessionReport> {
    if authorities.is_empty() {
        return Err(SealingError::NoAuthorities.into());
    }

    let stream = source.stream();
    let chunk_span =
        chrono::Duration::from_std(config.chunk_duration).unwrap_or(chrono::Duration::MAX);

    let (chunk_tx, chunk_rx) = mpsc::channel(config.queue_capacity.max(1));
    let (sealed_tx, sealed_rx) = mpsc::channel(config.queue_capacity.max(1));

    let seal_task = tokio::spawn(seal_stage(
        chunk_rx,
        sealed_tx,
        Arc::new(authorities),
        session,
        config.seal_concurrency.max(1),
    ));
    let write_task = tokio::spawn(write_stage(sealed_rx, Arc::clone(&store)));

    info!(session = %session, stream = %stream, "recording session started");

    let mut sequence: u64 = 0;
    let mut buf: Vec<u8> = Vec::new();
    let mut range: Option<TimeRange> = None;
    let mut overrun: Option<u64> = None;
    let mut pipeline_closed = false;

    loop {
        let frame = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    debug!(session = %session, "stop requested");
                    break;
                }
                continue;
            }
            // The seal stage exits when the writer dies; stop capturing at
            // once instead of waiting for the next chunk cut.
            _ = chunk_tx.closed() => {
                pipeline_closed = true;
                break;
            }
            frame = source.next_frame() => frame?,
        };
        let Some(mut frame) = frame else { break };

        match range.as_mut() {
            None => range = Some(TimeRange::new(frame.captured_at, frame.captured_at)),
            Some(r) => r.end = frame.captured_at,
        }
        buf.extend_from_slice(&frame.data);
        frame.data.zeroize();

        let Some(current) = range else { continue };
        if current.duration() >= chunk_span || buf.len() >= config.max_chunk_bytes {
            sequence += 1;
            let chunk = Chunk::new(stream.clone(), std::mem::take(&mut buf), current);
            range = None;
            match chunk_tx.try_send((sequence, chunk)) {
                Ok(()) => debug!(session = %session, sequence, "chunk queued for sealing"),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session = %session, sequence, "seal pipeline backlogged");
                    overrun = Some(sequence);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    pipeline_closed = true;
                    break;
                }
            }
        }
    }

    // Flush the partial chunk so a stop never discards captured frames.
    if !buf.is_empty() {
        if let Some(r) = range {
            sequence += 1;
            let chunk = Chunk::new(stream.clone(), std::mem::take(&mut buf), r);
            if chunk_tx.send((sequence, chunk)).await.is_err() {
                pipeline_closed = true;
            }
        }
    }
    drop(chunk_tx);

    let _ = seal_task.await;
    let stats = write_task
        .await
        .map_err(|e| RecorderError::Task(e.to_string()))??;

    if let Some(sequence) = overrun {
        return Err(RecorderError::CaptureOverrun { sequence });
    }
    if pipeline_closed {
        return Err(RecorderError::Task(
            "seal pipeline terminated early".to_string(),
        ));
    }

    info!(
        session = %session,
        containers = stats.containers,
        raw_bytes = stats.raw_bytes,
        "recording session finished"
    );
    Ok(SessionReport {
        session,
        containers: stats.containers,
        raw_bytes: stats.raw_bytes,
    })
}

/// Seals queued chunks in parallel, bounded by a semaphore. Results are sent
/// on in completion order; the writer restores sequence order.
async fn seal_stage(
    mut rx: mpsc::Receiver<(u64, Chunk)>,
    tx: mpsc::Sender<(u64, usize, RecorderResult<Container>)>,
    authorities: Arc<Vec<EscrowAuthority>>,
    session: SessionId,
    concurrency: usize,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    loop {
        let next = tokio::select! {
            // Writer gone: stop pulling chunks so the capture loop sees its
            // channel close instead of sealing into the void.
            _ = tx.closed() => return,
            next = rx.recv() => next,
        };
        let Some((sequence, chunk)) = next else { return };
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let tx = tx.clone();
        let authorities = Arc::clone(&authorities);
        tokio::spawn(async move {
            let raw_len = chunk.len();
            let sealed = tokio::task::spawn_blocking(move || {
                seal_chunk(&chunk, session, sequence, &authorities)
            })
            .await;
            let result = match sealed {
                Ok(result) => result.map_err(RecorderError::from),
                Err(e) => Err(RecorderError::Task(e.to_string())),
            };
            let _ = tx.send((sequence, raw_len, result)).await;
            drop(permit);
        });
    }
}

struct WriterStats {
    containers: u64,
    raw_bytes: u64,
}

/// Appends sealed containers strictly in sequence order, starting at 1.
async fn write_stage(
    mut rx: mpsc::Receiver<(u64, usize, RecorderResult<Container>)>,
    store: Arc<RecordingStore>,
) -> RecorderResult<WriterStats> {
    let mut pending: BTreeMap<u64, (usize, Container)> = BTreeMap::new();
    let mut next: u64 = 1;
    let mut stats = WriterStats {
        containers: 0,
        raw_bytes: 0,
    };

    while let Some((sequence, raw_len, result)) = rx.recv().await {
        let container = result?;
        pending.insert(sequence, (raw_len, container));

        // Later chunks wait in the reorder buffer for earlier ones.
        while let Some((raw_len, container)) = pending.remove(&next) {
            store.append(&container).await?;
            stats.containers += 1;
            stats.raw_bytes += raw_len as u64;
            next += 1;
        }
    }
    Ok(stats)
}
