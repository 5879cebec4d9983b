//! Download engine for concurrent, cancellable batch transfers.
//!
//! The engine spawns one Tokio task per [`DownloadTask`]. Each task waits for
//! a slot on the engine's semaphore, streams its source into its destination
//! through the shared [`RateLimiter`], and reports every state change to the
//! caller's [`ProgressSink`]. A failure in one task never affects the others;
//! the aggregate result only reports cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetchpool::download::{
//!     DownloadEngine, DownloadTask, FileSink, HttpSource, NoopProgress, RateLimiter,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(4, Arc::new(RateLimiter::new(1024 * 1024)))?;
//! let tasks = vec![DownloadTask::from_url("https://example.com/a.bin")];
//! let summary = engine
//!     .run(
//!         tasks,
//!         Arc::new(HttpSource::new()?),
//!         Arc::new(FileSink::new("./downloads")),
//!         Arc::new(NoopProgress),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("completed: {}, failed: {}", summary.completed, summary.failed);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use super::progress::{ProgressEvent, ProgressSink};
use super::rate_limiter::RateLimiter;
use super::sink::DestinationSink;
use super::source::RemoteSource;
use super::task::DownloadTask;
use super::worker::{TaskOutcome, WorkerContext, transfer};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The run was canceled before every task finished.
    #[error("run canceled ({summary})")]
    Canceled {
        /// Counts at the moment the last task stopped.
        summary: RunSummary,
    },

    /// The spawned run itself could not be joined.
    #[error("download run aborted: {0}")]
    Join(#[from] JoinError),
}

/// Final counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks that ended `Completed`.
    pub completed: usize,
    /// Tasks that ended `Failed`.
    pub failed: usize,
    /// Tasks that ended `Canceled`.
    pub canceled: usize,
    /// Bytes written by completed tasks.
    pub bytes: u64,
}

impl RunSummary {
    /// Number of tasks that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.canceled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} failed, {} canceled, {} bytes",
            self.completed, self.failed, self.canceled, self.bytes
        )
    }
}

/// Counters updated concurrently by the spawned tasks.
#[derive(Debug, Default)]
struct RunStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    canceled: AtomicUsize,
    bytes: AtomicU64,
}

impl RunStats {
    fn record(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { bytes } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes, Ordering::SeqCst);
            }
            TaskOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            TaskOutcome::Canceled => {
                self.canceled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn snapshot(&self) -> RunSummary {
        RunSummary {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            canceled: self.canceled.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

/// Download engine with bounded concurrency and a shared rate ceiling.
///
/// # Concurrency Model
///
/// - Each task runs in its own Tokio task
/// - A semaphore permit is acquired before the transfer opens its source
/// - The permit is released only after the task's terminal event
/// - Runs started concurrently on the same engine share its slots
///
/// Cloning is cheap; clones share the semaphore and the rate limiter.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Global byte-rate limiter.
    rate_limiter: Arc<RateLimiter>,
}

impl DownloadEngine {
    /// Creates a new engine with the given concurrency limit and rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use fetchpool::download::{DownloadEngine, RateLimiter};
    ///
    /// let engine = DownloadEngine::new(4, Arc::new(RateLimiter::disabled())).unwrap();
    /// assert_eq!(engine.concurrency(), 4);
    /// ```
    #[instrument(level = "debug", skip(rate_limiter))]
    pub fn new(concurrency: usize, rate_limiter: Arc<RateLimiter>) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            rate_limit = rate_limiter.bytes_per_second(),
            rate_limit_disabled = rate_limiter.is_disabled(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            rate_limiter,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Downloads every task and waits until each one is terminal.
    ///
    /// Individual failures are reported only through `progress` and counted
    /// in the summary; they do not make this method fail.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Canceled`] if `cancel` fired and at least one
    /// task stopped because of it.
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        source: Arc<dyn RemoteSource>,
        sink: Arc<dyn DestinationSink>,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        // Dropping this future cancels every worker it spawned, so none of
        // them keeps holding a slot after the run is gone.
        let workers_cancel = cancel.child_token();
        let _stop_workers = workers_cancel.clone().drop_guard();

        let ctx = Arc::new(WorkerContext {
            semaphore: Arc::clone(&self.semaphore),
            pool_size: self.concurrency,
            rate_limiter: Arc::clone(&self.rate_limiter),
            source,
            sink,
            progress,
            cancel: workers_cancel,
        });
        let stats = Arc::new(RunStats::default());

        info!("starting download run");

        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(tasks.len());
        for task in tasks {
            let name = task.name().to_string();
            let ctx = Arc::clone(&ctx);
            let stats = Arc::clone(&stats);
            handles.push((
                name,
                tokio::spawn(async move {
                    let outcome = transfer(&ctx, &task).await;
                    stats.record(&outcome);
                }),
            ));
        }

        debug!(
            task_count = handles.len(),
            "waiting for downloads to complete"
        );

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                // A panicking worker never emitted its terminal event.
                warn!(task = %name, error = %e, "download task panicked");
                ctx.emit(ProgressEvent::failed(
                    &name,
                    0,
                    None,
                    ctx.active_slots(),
                    format!("worker panicked: {e}"),
                ));
                stats.record(&TaskOutcome::Failed {
                    detail: e.to_string(),
                });
            }
        }

        let summary = stats.snapshot();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            canceled = summary.canceled,
            bytes = summary.bytes,
            "download run complete"
        );

        if summary.canceled > 0 && cancel.is_cancelled() {
            return Err(EngineError::Canceled { summary });
        }
        Ok(summary)
    }

    /// Spawns [`run`](Self::run) with a fresh cancellation token.
    ///
    /// Dropping the returned handle (or a pending [`RunHandle::wait`])
    /// cancels the run. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(
        &self,
        tasks: Vec<DownloadTask>,
        source: Arc<dyn RemoteSource>,
        sink: Arc<dyn DestinationSink>,
        progress: Arc<dyn ProgressSink>,
    ) -> RunHandle {
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let token = cancel.clone();
        let join =
            tokio::spawn(async move { engine.run(tasks, source, sink, progress, token).await });
        RunHandle {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            join,
        }
    }
}

/// Handle to a run started with [`DownloadEngine::start`].
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary, EngineError>>,
    _cancel_on_drop: DropGuard,
}

impl RunHandle {
    /// Requests cancellation of the run. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The run's cancellation token, for composing deadlines or signals.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Canceled`] for a canceled run, or
    /// [`EngineError::Join`] if the run task itself was aborted.
    pub async fn wait(self) -> Result<RunSummary, EngineError> {
        self.join.await?
    }
}
