//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use fetchpool::download::DEFAULT_CONCURRENCY;
use fetchpool::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Download a list of files concurrently.
///
/// Reads `URL [NAME]` lines from the arguments, an input file, or stdin and
/// downloads them into the output directory with bounded concurrency and an
/// optional aggregate bandwidth ceiling.
#[derive(Parser, Debug)]
#[command(name = "fetchpool")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when none and no --input-file)
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Read the task list from a file (`URL [NAME]` per line)
    #[arg(short = 'i', long, value_name = "PATH", conflicts_with = "urls")]
    pub input_file: Option<PathBuf>,

    /// Directory downloads are written to (default: current directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Aggregate bandwidth ceiling in bytes/sec, with optional K/M/G suffix (0 or negative disables)
    #[arg(
        short = 'l',
        long,
        default_value = "0",
        allow_hyphen_values = true,
        value_parser = parse_byte_rate
    )]
    pub rate_limit: u64,

    /// Connect timeout in seconds (1-3600)
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds (1-3600)
    #[arg(long, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout_secs: u64,

    /// Cancel the whole run after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Print progress events as JSON lines on stdout instead of progress bars
    #[arg(long)]
    pub json_events: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses `512`, `64K`, `1.5M`, `2G` (binary multiples) into bytes/sec.
///
/// Negative values such as `-1` mean unlimited and parse as 0.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub(crate) fn parse_byte_rate(raw: &str) -> Result<u64, String> {
    let invalid = || format!("invalid byte rate '{raw}': expected e.g. 512, 64K, 2M");
    let trimmed = raw.trim();
    if let Some(magnitude) = trimmed.strip_prefix('-') {
        return parse_byte_rate(magnitude).map(|_| 0).map_err(|_| invalid());
    }
    let multiplier: Option<f64> = match trimmed.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => Some(1024.0),
        Some('M') => Some(1024.0 * 1024.0),
        Some('G') => Some(1024.0 * 1024.0 * 1024.0),
        _ => None,
    };

    let Some(multiplier) = multiplier else {
        return trimmed.parse::<u64>().map_err(|_| invalid());
    };

    let value: f64 = trimmed[..trimmed.len() - 1]
        .trim()
        .parse()
        .map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid byte rate '{raw}': must be non-negative"));
    }
    let bytes = (value * multiplier).round();
    if bytes >= u64::MAX as f64 {
        return Err(format!("invalid byte rate '{raw}': too large"));
    }
    Ok(bytes as u64)
}
