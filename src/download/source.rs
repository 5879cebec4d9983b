//! Remote content sources.
//!
//! The worker only sees a [`RemoteSource`]: something that turns an address
//! into a byte stream plus an optional size hint. [`HttpSource`] is the
//! reqwest-backed implementation used by the CLI.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;

/// User-Agent sent by [`HttpSource`].
pub const DEFAULT_USER_AGENT: &str = concat!("fetchpool/", env!("CARGO_PKG_VERSION"));

/// An open remote byte stream.
///
/// Dropping it releases the underlying connection.
pub struct RemoteStream {
    /// The content bytes.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Total size if the source announced one.
    pub size_hint: Option<u64>,
}

impl RemoteStream {
    /// Wraps a reader with an optional size hint.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, size_hint: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            size_hint,
        }
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("size_hint", &self.size_hint)
            .finish_non_exhaustive()
    }
}

/// Opens remote addresses for reading.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Opens `address` and returns its content stream.
    ///
    /// # Errors
    ///
    /// Returns a transport-class [`DownloadError`] when the address is
    /// invalid, unreachable, or answers with a non-success status.
    async fn open(&self, address: &str) -> Result<RemoteStream, DownloadError>;
}

/// HTTP(S) source backed by a shared reqwest client.
///
/// Created once and cloned freely; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Creates a source with the default timeouts (30s connect, 5min read).
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a source with explicit timeout values in seconds.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    #[instrument(skip(self), fields(url = %address))]
    async fn open(&self, address: &str) -> Result<RemoteStream, DownloadError> {
        let parsed = Url::parse(address).map_err(|_| DownloadError::invalid_url(address))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(address));
        }

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(address)
            } else {
                DownloadError::network(address, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(address, status.as_u16()));
        }

        let size_hint = content_length(&response);
        debug!(status = status.as_u16(), ?size_hint, "remote stream opened");

        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(RemoteStream::new(StreamReader::new(body), size_hint))
    }
}

/// Content-Length of an uncompressed response.
///
/// A compressed body is decoded on the fly, so its header length does not
/// describe the bytes the worker will see.
fn content_length(response: &reqwest::Response) -> Option<u64> {
    let encoded = response
        .headers()
        .get(reqwest::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.eq_ignore_ascii_case("identity"));
    if encoded {
        return None;
    }

    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
