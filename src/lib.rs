//! fetchpool core library
//!
//! Downloads a batch of remote files concurrently: a bounded pool of
//! transfer workers, a global byte-rate ceiling, structured progress events,
//! cooperative cancellation, and per-task failure isolation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Engine, transfer worker, rate limiter, sources and sinks
//! - [`parser`] - Task-list parsing (`URL [NAME]` lines)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod parser;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DestinationSink, DownloadEngine, DownloadError, DownloadTask,
    EngineError, FileSink, HttpSource, ProgressEvent, ProgressSink, ProgressStatus, RateLimiter,
    RemoteSource, RunHandle, RunSummary,
};
pub use parser::{ParseResult, parse_task_list, read_task_file};
