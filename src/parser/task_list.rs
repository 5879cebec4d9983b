//! Line-oriented task lists.
//!
//! ```text
//! # comment
//! https://example.com/a.pdf
//! https://example.com/b.pdf  report.pdf
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, trace};
use url::Url;

use super::error::{InputError, MAX_URL_LENGTH, ParseError};
use crate::download::DownloadTask;
use crate::download::filename::{fallback_filename_from_url, sanitize_filename, unique_name};

/// `URL [NAME]`, with surrounding whitespace ignored.
#[allow(clippy::expect_used)]
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<url>\S+)(?:\s+(?P<name>\S(?:.*\S)?))?\s*$")
        .expect("line regex is valid") // Static pattern, safe to panic
});

/// A line that did not produce a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the input
    pub line_number: usize,
    /// Why it was skipped
    pub error: ParseError,
}

/// Tasks parsed from a task list, plus the lines that were rejected.
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Tasks in input order, with unique names
    pub tasks: Vec<DownloadTask>,
    /// Lines that could not be turned into tasks
    pub skipped: Vec<SkippedLine>,
}

impl ParseResult {
    /// Creates a new empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsed tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Parses a task list.
///
/// Blank lines and lines starting with `#` are ignored. Lines whose first
/// token is not a valid http(s) URL are recorded in `skipped`. When no name
/// is given it is derived from the URL's last path segment. Names that repeat
/// get `_2`, `_3`, ... inserted before the extension; the name doubles as the
/// destination identifier.
///
/// # Example
///
/// ```
/// use fetchpool::parser::parse_task_list;
///
/// let result = parse_task_list("https://example.com/a.pdf\nhttps://mirror.org/a.pdf\n");
/// assert_eq!(result.tasks[0].name(), "a.pdf");
/// assert_eq!(result.tasks[1].name(), "a_2.pdf");
/// ```
#[instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_task_list(input: &str) -> ParseResult {
    let mut result = ParseResult::new();
    let mut taken: HashSet<String> = HashSet::new();

    for (index, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(caps) = LINE_PATTERN.captures(trimmed) else {
            continue;
        };
        let line_number = index + 1;
        let raw_url = &caps["url"];

        let url = match validate_url(raw_url) {
            Ok(url) => url,
            Err(error) => {
                debug!(line_number, error = %error, "skipping line");
                result.skipped.push(SkippedLine { line_number, error });
                continue;
            }
        };

        let base_name = caps
            .name("name")
            .map(|m| sanitize_filename(m.as_str()))
            .unwrap_or_else(|| fallback_filename_from_url(Some(&url)));
        let name = unique_name(&base_name, &mut taken);
        trace!(line_number, url = %url, name = %name, "parsed task");

        result
            .tasks
            .push(DownloadTask::new(url.as_str(), name.clone(), name));
    }

    info!(
        tasks = result.tasks.len(),
        skipped = result.skipped.len(),
        "task list parsed"
    );
    result
}

/// Reads and parses a task-list file.
///
/// # Errors
///
/// Returns [`InputError::Read`] if the file cannot be read as UTF-8 text.
#[instrument(fields(path = %path.display()))]
pub fn read_task_file(path: &Path) -> Result<ParseResult, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_task_list(&text))
}

/// Validates a URL string.
///
/// - Must not exceed `MAX_URL_LENGTH`
/// - Must be parseable by the `url` crate
/// - Must use http or https
/// - Must have a host
fn validate_url(raw: &str) -> Result<Url, ParseError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(ParseError::too_long(raw));
    }

    let parsed = Url::parse(raw).map_err(|e| ParseError::malformed(raw, &e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(ParseError::unsupported_scheme(raw, scheme)),
    }

    if parsed.host().is_none() {
        return Err(ParseError::no_host(raw));
    }

    Ok(parsed)
}
