//! Constants for the download module (chunking, timeouts, rate accounting).

use std::time::Duration;

/// Fixed read size for one transfer chunk (8 KiB).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Length of the rate limiter's accounting window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);
