//! Destination sinks.
//!
//! A [`DestinationSink`] maps a task's destination identifier to a writable
//! stream. [`FileSink`] writes files under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tracing::{debug, instrument};

use super::error::DownloadError;
use super::filename::resolve_within;

/// A writable destination stream owned by one worker.
pub type SinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens destinations for writing.
#[async_trait]
pub trait DestinationSink: Send + Sync {
    /// Opens `identifier` for writing, truncating any previous content.
    ///
    /// # Errors
    ///
    /// Returns a sink-class [`DownloadError`] on permission or space
    /// problems, or when the identifier is not acceptable.
    async fn open_for_write(&self, identifier: &str) -> Result<SinkWriter, DownloadError>;

    /// Drops whatever a failed or canceled transfer left at `identifier`.
    ///
    /// Called after the writer has been dropped. The default keeps it.
    async fn discard(&self, identifier: &str) -> Result<(), DownloadError> {
        let _ = identifier;
        Ok(())
    }
}

/// Writes each destination as a file below `root`.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    /// Creates a sink rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this sink.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an identifier onto a path below the root.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidDestination`] for absolute paths and
    /// identifiers containing `..`.
    pub fn path_for(&self, identifier: &str) -> Result<PathBuf, DownloadError> {
        resolve_within(&self.root, identifier)
            .ok_or_else(|| DownloadError::invalid_destination(identifier))
    }
}

#[async_trait]
impl DestinationSink for FileSink {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn open_for_write(&self, identifier: &str) -> Result<SinkWriter, DownloadError> {
        let path = self.path_for(identifier)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        debug!(path = %path.display(), "destination opened");
        Ok(Box::new(file))
    }

    async fn discard(&self, identifier: &str) -> Result<(), DownloadError> {
        let path = self.path_for(identifier)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed partial file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::io(path, e)),
        }
    }
}
