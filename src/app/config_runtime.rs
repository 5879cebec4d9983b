use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use fetchpool::download::{MAX_CONCURRENCY, MIN_CONCURRENCY};

use crate::app::config::{FileConfig, VerbositySetting};
use crate::cli::Args;

/// Which arguments were typed on the command line (and therefore beat the
/// config file).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) concurrency: bool,
    pub(crate) rate_limit: bool,
    pub(crate) connect_timeout_secs: bool,
    pub(crate) read_timeout_secs: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = sources_from_matches(&matches);
    (args, sources)
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        output_dir: is_commandline_value(matches, "output_dir"),
        concurrency: is_commandline_value(matches, "concurrency"),
        rate_limit: is_commandline_value(matches, "rate_limit"),
        connect_timeout_secs: is_commandline_value(matches, "connect_timeout_secs"),
        read_timeout_secs: is_commandline_value(matches, "read_timeout_secs"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every argument not given on the command line from `file_config`,
/// then validates the effective values.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<Args> {
    if let Some(file_config) = file_config {
        if !cli_sources.output_dir
            && args.output_dir.is_none()
            && let Some(output_dir) = &file_config.output_dir
        {
            args.output_dir = Some(output_dir.clone());
        }

        if !cli_sources.concurrency
            && let Some(concurrency) = file_config.concurrency
        {
            args.concurrency = concurrency;
        }

        if !cli_sources.rate_limit
            && let Some(rate_limit) = file_config.rate_limit
        {
            args.rate_limit = rate_limit;
        }

        if !cli_sources.connect_timeout_secs
            && let Some(secs) = file_config.connect_timeout_secs
        {
            args.connect_timeout_secs = secs;
        }

        if !cli_sources.read_timeout_secs
            && let Some(secs) = file_config.read_timeout_secs
        {
            args.read_timeout_secs = secs;
        }

        if !cli_sources.verbose
            && !cli_sources.quiet
            && let Some(verbosity) = file_config.verbosity
        {
            apply_config_verbosity(&mut args, verbosity);
        }
    }

    if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&usize::from(args.concurrency)) {
        bail!(
            "Invalid effective concurrency value: {}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
            args.concurrency
        );
    }

    Ok(args)
}

fn apply_config_verbosity(args: &mut Args, verbosity: VerbositySetting) {
    match verbosity {
        VerbositySetting::Default => {
            args.quiet = false;
            args.verbose = 0;
        }
        VerbositySetting::Verbose => {
            args.quiet = false;
            args.verbose = 1;
        }
        VerbositySetting::Quiet => {
            args.quiet = true;
            args.verbose = 0;
        }
        VerbositySetting::Debug => {
            args.quiet = false;
            args.verbose = 2;
        }
    }
}

/// Default filter when `RUST_LOG` is not set.
///
/// Per-task events are logged at info, so the default stays at warn to keep
/// stderr readable next to the progress bars.
pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Explicit `-v`/`-q` on the command line beats `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn parse(argv: &[&str]) -> (Args, CliValueSources) {
        let matches = Args::command().try_get_matches_from(argv).unwrap();
        let args = Args::from_arg_matches(&matches).unwrap();
        (args, sources_from_matches(&matches))
    }

    fn file_config() -> FileConfig {
        FileConfig {
            output_dir: Some(PathBuf::from("/from/config")),
            concurrency: Some(8),
            rate_limit: Some(4096),
            connect_timeout_secs: Some(5),
            read_timeout_secs: Some(50),
            verbosity: Some(VerbositySetting::Quiet),
        }
    }

    #[test]
    fn test_sources_track_only_explicit_values() {
        let (_, sources) = parse(&["fetchpool", "-c", "2"]);
        assert!(sources.concurrency);
        assert!(!sources.rate_limit);
        assert!(!sources.output_dir);
    }

    #[test]
    fn test_config_fills_unset_values() {
        let (args, sources) = parse(&["fetchpool"]);
        let args = apply_config_defaults(args, &sources, Some(&file_config())).unwrap();

        assert_eq!(args.output_dir, Some(PathBuf::from("/from/config")));
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.rate_limit, 4096);
        assert_eq!(args.connect_timeout_secs, 5);
        assert_eq!(args.read_timeout_secs, 50);
        assert!(args.quiet);
    }

    #[test]
    fn test_explicit_cli_values_win_over_config() {
        let (args, sources) = parse(&[
            "fetchpool",
            "-c",
            "2",
            "-l",
            "1K",
            "-o",
            "/from/cli",
            "--read-timeout-secs",
            "7",
            "-v",
        ]);
        let args = apply_config_defaults(args, &sources, Some(&file_config())).unwrap();

        assert_eq!(args.output_dir, Some(PathBuf::from("/from/cli")));
        assert_eq!(args.concurrency, 2);
        assert_eq!(args.rate_limit, 1024);
        assert_eq!(args.read_timeout_secs, 7);
        assert_eq!(args.connect_timeout_secs, 5);
        assert!(!args.quiet);
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_explicit_default_value_still_wins() {
        // Typing the default must not be overridden by the file
        let (args, sources) = parse(&["fetchpool", "-c", "4"]);
        let args = apply_config_defaults(args, &sources, Some(&file_config())).unwrap();
        assert_eq!(args.concurrency, 4);
    }

    #[test]
    fn test_no_config_keeps_cli_defaults() {
        let (args, sources) = parse(&["fetchpool"]);
        let args = apply_config_defaults(args, &sources, None).unwrap();
        assert_eq!(args.concurrency, 4);
        assert_eq!(args.rate_limit, 0);
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_effective_concurrency_is_validated() {
        let (args, sources) = parse(&["fetchpool"]);
        let bad = FileConfig {
            concurrency: Some(0),
            ..FileConfig::default()
        };
        assert!(apply_config_defaults(args, &sources, Some(&bad)).is_err());
    }

    #[test]
    fn test_log_level_mapping() {
        let (args, _) = parse(&["fetchpool"]);
        assert_eq!(resolve_default_log_level(&args), "warn");
        let (args, _) = parse(&["fetchpool", "-vv"]);
        assert_eq!(resolve_default_log_level(&args), "debug");
        let (args, _) = parse(&["fetchpool", "-q"]);
        assert_eq!(resolve_default_log_level(&args), "error");
    }

    #[test]
    fn test_force_cli_log_level_only_when_flag_typed() {
        let (_, sources) = parse(&["fetchpool"]);
        assert!(!should_force_cli_log_level(&sources));
        let (_, sources) = parse(&["fetchpool", "-q"]);
        assert!(should_force_cli_log_level(&sources));
    }

    #[test]
    fn test_verbosity_debug_from_config() {
        let (args, sources) = parse(&["fetchpool"]);
        let cfg = FileConfig {
            verbosity: Some(VerbositySetting::Debug),
            ..FileConfig::default()
        };
        let args = apply_config_defaults(args, &sources, Some(&cfg)).unwrap();
        assert_eq!(args.verbose, 2);
    }
}
