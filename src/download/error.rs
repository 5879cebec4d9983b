//! Error types for the download module.
//!
//! Every per-task failure is expressed as a [`DownloadError`]. The worker
//! converts these into a `Failed` (or `Canceled`) progress event at its
//! boundary, so none of them ever reach the caller of a run.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`DownloadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Remote open/read failure or non-success response.
    Transport,
    /// Destination open/write failure.
    Sink,
    /// Out of space or a similar exhausted resource.
    ResourceExhaustion,
    /// Cooperative stop requested.
    Cancellation,
    /// Bug in a collaborator, such as a panicking reader.
    Internal,
}

/// Errors that can occur while transferring a single task.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The remote stream failed mid-transfer.
    #[error("read error downloading {url}: {source}")]
    Read {
        /// The URL being read.
        url: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// File system error while writing the destination.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The destination where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Destination identifier cannot be mapped to a writable location.
    #[error("invalid destination: {identifier}")]
    InvalidDestination {
        /// The rejected identifier.
        identifier: String,
    },

    /// A resource such as disk space ran out.
    #[error("resource exhausted writing to {path}: {source}")]
    ResourceExhausted {
        /// The destination where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Transferred size does not match the size announced by the source.
    #[error("integrity check failed for {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// The URL that was downloaded.
        url: String,
        /// Size hint reported when the stream was opened.
        expected_bytes: u64,
        /// Bytes actually transferred.
        actual_bytes: u64,
    },

    /// The run's cancellation token fired.
    #[error("download canceled")]
    Canceled,

    /// The transfer panicked; the payload message is kept when it is a string.
    #[error("worker panicked: {message}")]
    Panicked {
        /// Panic payload, or a placeholder for non-string payloads.
        message: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a remote read error.
    pub fn read(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Read {
            url: url.into(),
            source,
        }
    }

    /// Creates a destination IO error, promoting out-of-space conditions to
    /// [`DownloadError::ResourceExhausted`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if is_storage_full(&source) {
            return Self::ResourceExhausted {
                path: path.into(),
                source,
            };
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid destination error.
    pub fn invalid_destination(identifier: impl Into<String>) -> Self {
        Self::InvalidDestination {
            identifier: identifier.into(),
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a panic error from a caught unwind payload.
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { message }
    }

    /// Returns the taxonomy bucket this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::InvalidUrl { .. }
            | Self::Read { .. }
            | Self::Integrity { .. } => ErrorKind::Transport,
            Self::Io { .. } | Self::InvalidDestination { .. } => ErrorKind::Sink,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhaustion,
            Self::Canceled => ErrorKind::Cancellation,
            Self::Panicked { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is a cooperative cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

fn is_storage_full(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded
    )
}
