//! Global byte-rate ceiling shared by every transfer worker.
//!
//! The limiter keeps one accounting window (`window_start`, `bytes_in_window`)
//! for the whole run. After each chunk a worker calls [`RateLimiter::throttle`],
//! which records the chunk and, if the window is ahead of the configured
//! ceiling, suspends the worker until the window has been paid off.
//!
//! # Accounting
//!
//! For a chunk of `n` bytes:
//! - if at least one second has passed since `window_start`, the window is
//!   reset and the chunk passes without delay;
//! - otherwise `n` is added to `bytes_in_window` and the worker waits until
//!   `window_start + bytes_in_window / ceiling`, after which the window
//!   restarts empty.
//!
//! The record-and-decide step runs under a single lock, and the restart is
//! written in the same critical section (dated at the instant the waiting
//! worker resumes), so workers that arrive while another one is still
//! sleeping queue up behind it instead of discarding its bytes.
//!
//! This is a cooperative throttle, not a token bucket: a chunk that arrives
//! after an idle second passes for free, so throughput can burst above the
//! ceiling at sub-second granularity. Over any busy stretch the aggregate
//! stays at or below the ceiling.
//!
//! # Example
//!
//! ```
//! use fetchpool::download::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), fetchpool::download::DownloadError> {
//! let limiter = RateLimiter::new(512 * 1024);
//! let cancel = CancellationToken::new();
//! limiter.throttle(8192, &cancel).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use super::DownloadError;
use super::constants::RATE_WINDOW;

/// Shared byte-rate limiter.
///
/// Designed to be wrapped in `Arc` and shared by all workers of a run.
#[derive(Debug)]
pub struct RateLimiter {
    /// Ceiling in bytes per second; 0 means unlimited.
    bytes_per_second: u64,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    start: Instant,
    bytes: u64,
}

impl RateLimiter {
    /// Creates a limiter capping aggregate throughput at `bytes_per_second`.
    ///
    /// A ceiling of 0 disables limiting.
    #[must_use]
    #[instrument(level = "debug")]
    pub fn new(bytes_per_second: u64) -> Self {
        debug!("creating rate limiter");
        Self {
            bytes_per_second,
            window: Mutex::new(Window {
                start: Instant::now(),
                bytes: 0,
            }),
        }
    }

    /// Creates a limiter that never delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Returns whether limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.bytes_per_second == 0
    }

    /// Returns the configured ceiling (0 when disabled).
    #[must_use]
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Records `bytes` against the current window and returns how long the
    /// caller must wait before transferring more.
    ///
    /// This is the single serialized update-and-decide step; callers that
    /// are handed a non-zero delay are expected to honor it.
    pub fn record(&self, bytes: u64) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }

        let mut window = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if now.saturating_duration_since(window.start) >= RATE_WINDOW {
            window.start = now;
            window.bytes = 0;
            return Duration::ZERO;
        }

        window.bytes = window.bytes.saturating_add(bytes);
        let ready_at = window.start + self.time_to_send(window.bytes);
        if ready_at <= now {
            return Duration::ZERO;
        }

        window.start = ready_at;
        window.bytes = 0;
        ready_at - now
    }

    /// Records `bytes` and sleeps for the required delay, giving up early if
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Canceled`] if the token is canceled before
    /// the delay elapses.
    pub async fn throttle(
        &self,
        bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let delay = self.record(bytes);
        if delay.is_zero() {
            return Ok(());
        }

        trace!(delay_ms = delay.as_millis(), bytes, "throttling transfer");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::Canceled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn time_to_send(&self, bytes: u64) -> Duration {
        let nanos = u128::from(bytes) * 1_000_000_000 / u128::from(self.bytes_per_second);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
