//! The unit of work handed to the engine.

use std::fmt;

use url::Url;

use super::filename::fallback_filename_from_url;

/// Identity of one download: where to read, what to call it, where to write.
///
/// Tasks are created by the caller before a run starts and never change
/// afterwards. The `name` is the key progress events are reported under; the
/// engine does not deduplicate names, so callers must keep them unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    address: String,
    name: String,
    destination: String,
}

impl DownloadTask {
    /// Creates a task from explicit parts.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            destination: destination.into(),
        }
    }

    /// Creates a task whose name and destination are both derived from the
    /// last path segment of `url`.
    ///
    /// Unparsable input is kept as the address verbatim (the transfer will
    /// fail with an invalid-URL error) and gets a timestamped fallback name.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let name = Url::parse(url).map_or_else(
            |_| fallback_filename_from_url(None),
            |parsed| fallback_filename_from_url(Some(&parsed)),
        );
        Self::new(url, name.clone(), name)
    }

    /// Remote source address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Logical name used as the progress key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque destination identifier passed to the sink.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl fmt::Display for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.name, self.address)
    }
}
