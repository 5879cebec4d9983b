//! Task-list input parsing.
//!
//! Turns caller-supplied text into [`DownloadTask`](crate::download::DownloadTask)s.
//! Each non-comment line is `URL [NAME]`; invalid lines are reported back
//! rather than failing the whole list.
//!
//! # Example
//!
//! ```
//! use fetchpool::parser::parse_task_list;
//!
//! let result = parse_task_list("https://example.com/paper.pdf\n# skipped\n");
//! assert_eq!(result.len(), 1);
//! assert_eq!(result.tasks[0].name(), "paper.pdf");
//! ```

mod error;
mod task_list;

pub use error::{InputError, MAX_URL_LENGTH, ParseError};
pub use task_list::{ParseResult, SkippedLine, parse_task_list, read_task_file};
