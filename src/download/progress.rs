//! Progress events emitted by transfer workers.
//!
//! Each task produces `Starting`, zero or more `Downloading`, and exactly one
//! terminal event (`Completed`, `Failed`, or `Canceled`). Events for one task
//! are emitted sequentially by the worker that owns it; events for different
//! tasks interleave arbitrarily.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Lifecycle status carried by a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// A pool slot was acquired and the transfer is about to open the source.
    Starting,
    /// Bytes are flowing.
    Downloading,
    /// The whole stream was written to the destination.
    Completed,
    /// The task stopped because of an error.
    Failed,
    /// The task stopped because the run was canceled.
    Canceled,
}

impl ProgressStatus {
    /// Returns true for `Completed`, `Failed`, and `Canceled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Downloading => write!(f, "downloading"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// One progress report for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Logical name of the owning task.
    pub name: String,
    /// Lifecycle status.
    pub status: ProgressStatus,
    /// Cumulative bytes written so far; never decreases for a task.
    pub bytes_transferred: u64,
    /// Size hint from the source, when one was available.
    pub total_bytes: Option<u64>,
    /// Occupied pool slots at emission time (display only).
    pub active_slots: usize,
    /// Human-readable failure detail; only set on `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ProgressEvent {
    fn with_status(
        name: &str,
        status: ProgressStatus,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        active_slots: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            status,
            bytes_transferred,
            total_bytes,
            active_slots,
            error_detail: None,
        }
    }

    /// A `Starting` event.
    #[must_use]
    pub fn starting(name: &str, active_slots: usize) -> Self {
        Self::with_status(name, ProgressStatus::Starting, 0, None, active_slots)
    }

    /// A `Downloading` event.
    #[must_use]
    pub fn downloading(
        name: &str,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        active_slots: usize,
    ) -> Self {
        Self::with_status(
            name,
            ProgressStatus::Downloading,
            bytes_transferred,
            total_bytes,
            active_slots,
        )
    }

    /// A `Completed` event.
    #[must_use]
    pub fn completed(
        name: &str,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        active_slots: usize,
    ) -> Self {
        Self::with_status(
            name,
            ProgressStatus::Completed,
            bytes_transferred,
            total_bytes,
            active_slots,
        )
    }

    /// A `Failed` event carrying `detail`.
    #[must_use]
    pub fn failed(
        name: &str,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        active_slots: usize,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::with_status(
                name,
                ProgressStatus::Failed,
                bytes_transferred,
                total_bytes,
                active_slots,
            )
        }
    }

    /// A `Canceled` event.
    #[must_use]
    pub fn canceled(
        name: &str,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
        active_slots: usize,
    ) -> Self {
        Self::with_status(
            name,
            ProgressStatus::Canceled,
            bytes_transferred,
            total_bytes,
            active_slots,
        )
    }
}

/// Receiver of progress events, owned by the caller.
///
/// Called from worker tasks, possibly from several at once. Implementations
/// must return quickly; the engine does not buffer on their behalf.
pub trait ProgressSink: Send + Sync {
    /// Accepts one event.
    fn on_progress(&self, event: ProgressEvent);
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ProgressStatus::Starting.is_terminal());
        assert!(!ProgressStatus::Downloading.is_terminal());
        assert!(ProgressStatus::Completed.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
        assert!(ProgressStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_only_failed_carries_error_detail() {
        let failed = ProgressEvent::failed("a", 10, Some(20), 1, "HTTP 404");
        assert_eq!(failed.error_detail.as_deref(), Some("HTTP 404"));
        assert_eq!(failed.status, ProgressStatus::Failed);

        for event in [
            ProgressEvent::starting("a", 1),
            ProgressEvent::downloading("a", 5, None, 1),
            ProgressEvent::completed("a", 5, Some(5), 1),
            ProgressEvent::canceled("a", 5, None, 1),
        ] {
            assert!(event.error_detail.is_none(), "{event:?}");
        }
    }

    #[test]
    fn test_event_serializes_snake_case_status() {
        let json = serde_json::to_value(ProgressEvent::downloading("a", 5, None, 2)).unwrap();
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["bytes_transferred"], 5);
        assert!(json["total_bytes"].is_null());
        assert!(json.get("error_detail").is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_and_ignores_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.on_progress(ProgressEvent::starting("a", 1));
        assert_eq!(rx.recv().await.unwrap().name, "a");

        drop(rx);
        tx.on_progress(ProgressEvent::starting("b", 1));
    }
}
