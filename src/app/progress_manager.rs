//! Progress rendering for download runs.
//!
//! The engine reports through an unbounded channel; one renderer task drains
//! it and draws indicatif bars, JSON lines, or plain result lines.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use fetchpool::download::{ProgressEvent, ProgressStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;

const SIZED_TEMPLATE: &str =
    "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {msg}";
const UNSIZED_TEMPLATE: &str = "{prefix:.bold} {spinner} {bytes} {bytes_per_sec} {msg}";

/// How progress events reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderMode {
    /// One indicatif bar per task on stderr.
    Bars,
    /// Every event as a JSON line on stdout.
    Json,
    /// One stdout line per finished task.
    Lines,
    /// Nothing.
    Silent,
}

pub(crate) fn select_render_mode(json_events: bool, use_bars: bool, quiet: bool) -> RenderMode {
    if json_events {
        RenderMode::Json
    } else if quiet {
        RenderMode::Silent
    } else if use_bars {
        RenderMode::Bars
    } else {
        RenderMode::Lines
    }
}

/// Spawns the renderer. It finishes once every sender has been dropped.
pub(crate) fn spawn_progress_renderer(
    mode: RenderMode,
    mut events: UnboundedReceiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bars = BarSet::new();
        while let Some(event) = events.recv().await {
            match mode {
                RenderMode::Bars => bars.apply(&event),
                RenderMode::Json => match event_json_line(&event) {
                    Ok(line) => print_stdout(&line),
                    Err(e) => warn!(error = %e, "cannot serialize progress event"),
                },
                RenderMode::Lines => {
                    if let Some(line) = format_terminal_line(&event) {
                        print_stdout(&line);
                    }
                }
                RenderMode::Silent => {}
            }
        }
    })
}

fn print_stdout(line: &str) {
    // A closed stdout (e.g. `| head`) must not stop the run.
    let _ = writeln!(std::io::stdout().lock(), "{line}");
}

pub(crate) fn event_json_line(event: &ProgressEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Result line for a terminal event; `None` for in-flight statuses.
pub(crate) fn format_terminal_line(event: &ProgressEvent) -> Option<String> {
    match event.status {
        ProgressStatus::Completed => Some(format!(
            "completed {} ({} bytes)",
            event.name, event.bytes_transferred
        )),
        ProgressStatus::Failed => Some(format!(
            "failed    {}: {}",
            event.name,
            event.error_detail.as_deref().unwrap_or("unknown error")
        )),
        ProgressStatus::Canceled => Some(format!(
            "canceled  {} after {} bytes",
            event.name, event.bytes_transferred
        )),
        ProgressStatus::Starting | ProgressStatus::Downloading => None,
    }
}

struct BarSet {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl BarSet {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    fn bar_for(&mut self, event: &ProgressEvent) -> &ProgressBar {
        let multi = &self.multi;
        self.bars.entry(event.name.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(style(UNSIZED_TEMPLATE));
            bar.set_prefix(event.name.clone());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        })
    }

    fn apply(&mut self, event: &ProgressEvent) {
        let bar = self.bar_for(event);
        if let Some(total) = event.total_bytes
            && bar.length() != Some(total)
        {
            bar.set_length(total);
            bar.set_style(style(SIZED_TEMPLATE));
        }
        bar.set_position(event.bytes_transferred);

        match event.status {
            ProgressStatus::Starting => bar.set_message("connecting"),
            ProgressStatus::Downloading => bar.set_message(""),
            ProgressStatus::Completed => bar.finish_with_message("done"),
            ProgressStatus::Failed => bar.abandon_with_message(format!(
                "failed: {}",
                event.error_detail.as_deref().unwrap_or("unknown error")
            )),
            ProgressStatus::Canceled => bar.abandon_with_message("canceled"),
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_render_mode_priority() {
        assert_eq!(select_render_mode(true, true, true), RenderMode::Json);
        assert_eq!(select_render_mode(false, true, true), RenderMode::Silent);
        assert_eq!(select_render_mode(false, true, false), RenderMode::Bars);
        assert_eq!(select_render_mode(false, false, false), RenderMode::Lines);
    }

    #[test]
    fn test_format_terminal_line_only_for_terminal_events() {
        assert!(format_terminal_line(&ProgressEvent::starting("a", 1)).is_none());
        assert!(format_terminal_line(&ProgressEvent::downloading("a", 1, None, 1)).is_none());

        let line = format_terminal_line(&ProgressEvent::completed("a.bin", 42, Some(42), 1));
        assert_eq!(line.as_deref(), Some("completed a.bin (42 bytes)"));

        let line =
            format_terminal_line(&ProgressEvent::failed("b.bin", 0, None, 1, "HTTP 404")).unwrap();
        assert!(line.starts_with("failed"));
        assert!(line.contains("HTTP 404"));

        let line = format_terminal_line(&ProgressEvent::canceled("c", 7, None, 1)).unwrap();
        assert!(line.contains("7 bytes"));
    }

    #[test]
    fn test_event_json_line_is_single_line_object() {
        let line = event_json_line(&ProgressEvent::failed("a", 1, Some(2), 1, "boom")).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_detail"], "boom");
    }

    #[tokio::test]
    async fn test_renderer_finishes_when_senders_drop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_progress_renderer(RenderMode::Silent, rx);
        tx.send(ProgressEvent::starting("a", 1)).unwrap();
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bar_set_tracks_one_bar_per_task() {
        let mut bars = BarSet::new();
        bars.apply(&ProgressEvent::starting("a", 1));
        bars.apply(&ProgressEvent::downloading("a", 10, Some(100), 1));
        bars.apply(&ProgressEvent::starting("b", 2));
        bars.apply(&ProgressEvent::completed("a", 100, Some(100), 2));

        assert_eq!(bars.bars.len(), 2);
        let a = &bars.bars["a"];
        assert_eq!(a.length(), Some(100));
        assert_eq!(a.position(), 100);
        assert!(a.is_finished());
    }
}
