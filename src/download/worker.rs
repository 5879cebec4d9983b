//! The per-task transfer pipeline.
//!
//! One call to [`transfer`] takes a task from the pool gate to exactly one
//! terminal progress event. Every await point races the run's cancellation
//! token, and every error is converted into a `Failed` event here so that
//! nothing escapes to sibling tasks or the scheduler.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::CHUNK_SIZE;
use super::error::DownloadError;
use super::progress::{ProgressEvent, ProgressSink};
use super::rate_limiter::RateLimiter;
use super::sink::DestinationSink;
use super::source::RemoteSource;
use super::task::DownloadTask;

/// How a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// All bytes were written.
    Completed {
        /// Bytes written to the destination.
        bytes: u64,
    },
    /// The transfer stopped on an error.
    Failed {
        /// Human-readable reason, as reported in the `Failed` event.
        detail: String,
    },
    /// The run was canceled before the transfer finished.
    Canceled,
}

/// Everything a worker shares with its siblings.
pub(super) struct WorkerContext {
    pub(super) semaphore: Arc<Semaphore>,
    pub(super) pool_size: usize,
    pub(super) rate_limiter: Arc<RateLimiter>,
    pub(super) source: Arc<dyn RemoteSource>,
    pub(super) sink: Arc<dyn DestinationSink>,
    pub(super) progress: Arc<dyn ProgressSink>,
    pub(super) cancel: CancellationToken,
}

impl WorkerContext {
    /// Occupied pool slots right now.
    pub(super) fn active_slots(&self) -> usize {
        self.pool_size
            .saturating_sub(self.semaphore.available_permits())
    }

    pub(super) fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(event);
    }
}

/// Per-task counters carried across the pipeline's exit paths.
#[derive(Debug, Default)]
struct TransferState {
    bytes: u64,
    total: Option<u64>,
    sink_opened: bool,
}

/// Runs one task to its terminal state.
#[instrument(skip(ctx, task), fields(name = %task.name(), url = %task.address()))]
pub(super) async fn transfer(ctx: &WorkerContext, task: &DownloadTask) -> TaskOutcome {
    let Some(permit) = acquire_slot(ctx).await else {
        debug!("canceled while waiting for a pool slot");
        ctx.emit(ProgressEvent::canceled(
            task.name(),
            0,
            None,
            ctx.active_slots(),
        ));
        return TaskOutcome::Canceled;
    };

    let mut state = TransferState::default();
    // A panicking collaborator ends this task like any other error, with the
    // slot still held and the partial destination discarded below.
    let result = AssertUnwindSafe(run_pipeline(ctx, task, &mut state))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(DownloadError::panicked(payload.as_ref())));

    // Remote stream and writer are already dropped; the slot is still held so
    // the terminal event counts this worker.
    if result.is_err()
        && state.sink_opened
        && let Err(e) = ctx.sink.discard(task.destination()).await
    {
        warn!(error = %e, "failed to discard partial destination");
    }

    let active_slots = ctx.active_slots();
    let outcome = match result {
        Ok(()) => {
            info!(bytes = state.bytes, "download completed");
            ctx.emit(ProgressEvent::completed(
                task.name(),
                state.bytes,
                state.total,
                active_slots,
            ));
            TaskOutcome::Completed { bytes: state.bytes }
        }
        Err(DownloadError::Canceled) => {
            info!(bytes = state.bytes, "download canceled");
            ctx.emit(ProgressEvent::canceled(
                task.name(),
                state.bytes,
                state.total,
                active_slots,
            ));
            TaskOutcome::Canceled
        }
        Err(e) => {
            let detail = e.to_string();
            warn!(error = %detail, kind = ?e.kind(), bytes = state.bytes, "download failed");
            ctx.emit(ProgressEvent::failed(
                task.name(),
                state.bytes,
                state.total,
                active_slots,
                detail.clone(),
            ));
            TaskOutcome::Failed { detail }
        }
    };

    drop(permit);
    outcome
}

/// Waits for a pool slot; `None` once the run is canceled.
async fn acquire_slot(ctx: &WorkerContext) -> Option<OwnedSemaphorePermit> {
    let semaphore = Arc::clone(&ctx.semaphore);
    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok(),
    }
}

async fn run_pipeline(
    ctx: &WorkerContext,
    task: &DownloadTask,
    state: &mut TransferState,
) -> Result<(), DownloadError> {
    let name = task.name();
    ctx.emit(ProgressEvent::starting(name, ctx.active_slots()));

    let mut remote = cancellable(&ctx.cancel, ctx.source.open(task.address())).await?;
    state.total = remote.size_hint;

    let mut writer = cancellable(&ctx.cancel, ctx.sink.open_for_write(task.destination())).await?;
    state.sink_opened = true;

    debug!(total_bytes = ?state.total, "transfer started");
    ctx.emit(ProgressEvent::downloading(
        name,
        0,
        state.total,
        ctx.active_slots(),
    ));

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = cancellable(&ctx.cancel, async {
            remote
                .reader
                .read(&mut buf)
                .await
                .map_err(|e| DownloadError::read(task.address(), e))
        })
        .await?;
        if n == 0 {
            break;
        }

        cancellable(&ctx.cancel, async {
            writer
                .write_all(&buf[..n])
                .await
                .map_err(|e| DownloadError::io(task.destination(), e))
        })
        .await?;

        let chunk = n as u64;
        state.bytes += chunk;
        ctx.rate_limiter.throttle(chunk, &ctx.cancel).await?;
        ctx.emit(ProgressEvent::downloading(
            name,
            state.bytes,
            state.total,
            ctx.active_slots(),
        ));
    }
    drop(remote);

    cancellable(&ctx.cancel, async {
        writer
            .shutdown()
            .await
            .map_err(|e| DownloadError::io(task.destination(), e))
    })
    .await?;

    if let Some(expected) = state.total
        && expected != state.bytes
    {
        return Err(DownloadError::integrity(
            task.address(),
            expected,
            state.bytes,
        ));
    }

    Ok(())
}

/// Races `fut` against the cancellation token, preferring cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, DownloadError>
where
    F: Future<Output = Result<T, DownloadError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DownloadError::Canceled),
        result = fut => result,
    }
}
