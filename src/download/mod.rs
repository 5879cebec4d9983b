//! Concurrent batch download engine.
//!
//! This module streams a list of remote sources into destinations with a
//! bounded number of simultaneous transfers, a global byte-rate ceiling,
//! per-task progress events, and cooperative cancellation.
//!
//! # Features
//!
//! - Bounded concurrency (semaphore, 1-100 slots)
//! - Shared byte-rate limiter across all workers
//! - Streaming in 8 KiB chunks (memory-efficient for large files)
//! - One terminal progress event per task, failures isolated per task
//! - Pluggable [`RemoteSource`] and [`DestinationSink`] collaborators
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetchpool::download::{DownloadEngine, DownloadTask, FileSink, HttpSource, RateLimiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(3, Arc::new(RateLimiter::disabled()))?;
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = engine.start(
//!     vec![DownloadTask::from_url("https://example.com/paper.pdf")],
//!     Arc::new(HttpSource::new()?),
//!     Arc::new(FileSink::new("./downloads")),
//!     Arc::new(tx),
//! );
//! while let Some(event) = rx.recv().await {
//!     println!("{} {}", event.name, event.status);
//! }
//! let summary = handle.wait().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod engine;
mod error;
pub(crate) mod filename;
mod progress;
pub mod rate_limiter;
mod sink;
mod source;
mod task;
mod worker;

pub use engine::{
    DEFAULT_CONCURRENCY, DownloadEngine, EngineError, MAX_CONCURRENCY, MIN_CONCURRENCY,
    RunHandle, RunSummary,
};
pub use error::{DownloadError, ErrorKind};
pub use progress::{NoopProgress, ProgressEvent, ProgressSink, ProgressStatus};
pub use rate_limiter::RateLimiter;
pub use sink::{DestinationSink, FileSink, SinkWriter};
pub use source::{DEFAULT_USER_AGENT, HttpSource, RemoteSource, RemoteStream};
pub use task::DownloadTask;
pub use worker::TaskOutcome;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
