use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fetchpool::download::{
    DownloadEngine, EngineError, FileSink, HttpSource, RateLimiter, RunSummary,
};
use fetchpool::parser::{ParseResult, parse_task_list, read_task_file};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{config, config_runtime, exit_handler, progress_manager, terminal};
use crate::cli::Args;

pub(crate) async fn run_fetchpool() -> Result<ProcessExit> {
    let (args, cli_sources) = config_runtime::parse_cli_with_sources();
    let loaded = config::load_config(args.config.as_deref())?;
    let args = config_runtime::apply_config_defaults(args, &cli_sources, loaded.config.as_ref())?;

    terminal::init_tracing(
        config_runtime::resolve_default_log_level(&args),
        config_runtime::should_force_cli_log_level(&cli_sources),
    );
    debug!(?args, config_path = ?loaded.path, "configuration resolved");

    let Some(parsed) = load_tasks(&args)? else {
        if !args.quiet {
            eprintln!(
                "No input provided. Pass URLs as arguments, use --input-file, or pipe a task list on stdin."
            );
        }
        return Ok(ProcessExit::Success);
    };

    for skipped in &parsed.skipped {
        warn!(line = skipped.line_number, error = %skipped.error, "Skipped input line");
    }
    if parsed.is_empty() {
        if !args.quiet {
            eprintln!("No valid URLs found in input");
        }
        return Ok(if parsed.skipped.is_empty() {
            ProcessExit::Success
        } else {
            ProcessExit::Failure
        });
    }
    info!(
        tasks = parsed.len(),
        skipped = parsed.skipped.len(),
        "Parsed input"
    );

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    if !output_dir.exists() {
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory '{}'", output_dir.display())
        })?;
        info!(dir = %output_dir.display(), "Created output directory");
    }

    let source = HttpSource::with_timeouts(args.connect_timeout_secs, args.read_timeout_secs)
        .context("Failed to build HTTP client")?;
    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit));
    let engine = DownloadEngine::new(usize::from(args.concurrency), rate_limiter)?;

    let use_bars = terminal::should_use_progress_bars(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let mode = progress_manager::select_render_mode(args.json_events, use_bars, args.quiet);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let renderer = progress_manager::spawn_progress_renderer(mode, rx);

    let handle = engine.start(
        parsed.tasks,
        Arc::new(source),
        Arc::new(FileSink::new(&output_dir)),
        Arc::new(tx),
    );
    let watcher = spawn_cancel_watcher(
        handle.cancellation_token(),
        args.timeout_secs.map(Duration::from_secs),
    );

    let result = handle.wait().await;
    watcher.abort();
    if let Err(e) = renderer.await {
        warn!(error = %e, "progress renderer stopped unexpectedly");
    }

    let (summary, canceled) = match result {
        Ok(summary) => (summary, false),
        Err(EngineError::Canceled { summary }) => (summary, true),
        Err(e) => return Err(e.into()),
    };
    report_summary(&summary, canceled, args.quiet);

    Ok(exit_handler::determine_exit_outcome(
        summary.completed,
        summary.failed,
        canceled,
    ))
}

/// Reads the task list from `--input-file`, positional URLs, or piped stdin.
fn load_tasks(args: &Args) -> Result<Option<ParseResult>> {
    if let Some(path) = &args.input_file {
        return Ok(Some(read_task_file(path)?));
    }
    if !args.urls.is_empty() {
        return Ok(Some(parse_task_list(&args.urls.join("\n"))));
    }
    if io::stdin().is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read task list from stdin")?;
    if buffer.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_task_list(&buffer)))
}

/// Cancels `token` on Ctrl-C or once `deadline` elapses.
fn spawn_cancel_watcher(token: CancellationToken, deadline: Option<Duration>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        let expired = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = token.cancelled() => return,
            () = interrupt => warn!("Interrupt received, canceling downloads"),
            () = expired => warn!(timeout_secs = ?deadline.map(|d| d.as_secs()), "Deadline reached, canceling downloads"),
        }
        token.cancel();
    })
}

fn report_summary(summary: &RunSummary, canceled: bool, quiet: bool) {
    info!(
        completed = summary.completed,
        failed = summary.failed,
        canceled = summary.canceled,
        bytes = summary.bytes,
        "Download complete"
    );
    if quiet {
        return;
    }
    if canceled {
        eprintln!("Canceled: {summary}");
    } else {
        eprintln!("Finished: {summary}");
    }
}
