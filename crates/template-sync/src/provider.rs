use crate::engine::{SyncError, SyncReport};
use crate::item::{FileItem, ItemPath, TemplateItem};
use crate::progress::Progress;

/// Errors that can occur when talking to a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// A storage backend exposing one template tree.
///
/// Providers know how to list a directory's immediate children and download
/// file content from a particular backing store (a GitHub repository, a blob
/// container, a local directory). Write-capable backends additionally accept
/// uploads and deletions so they can serve as a mirror destination.
///
/// Not-found behavior differs by backend, deliberately: the filesystem
/// provider fails with [`ProviderError::NotFound`] when the listed directory
/// does not exist, while the GitHub and Blob providers return an empty
/// listing: both model directories implicitly via key prefixes, so a
/// missing directory is indistinguishable from an empty one.
#[async_trait::async_trait]
pub trait TemplatesProvider: Send + Sync {
    /// Human-readable label identifying this provider in logs and errors.
    fn label(&self) -> &str;

    /// List the immediate children (files and folders, non-recursive) of the
    /// directory at `path` within this provider's root. `""` or `"/"` means
    /// the root.
    async fn list(&self, path: &str) -> Result<Vec<TemplateItem>, ProviderError>;

    /// Download the file's current content. Transient failures are retried
    /// a bounded number of times with a delay between attempts.
    async fn download(&self, file: &FileItem) -> Result<Vec<u8>, ProviderError>;

    /// Whether this provider can act as a mirror destination.
    fn supports_write(&self) -> bool {
        false
    }

    /// Store `content` at `path`, overwriting any existing entry.
    async fn upload(&self, path: &ItemPath, content: Vec<u8>) -> Result<(), ProviderError> {
        let _ = content;
        Err(ProviderError::Unsupported(format!(
            "{} cannot store {path}",
            self.label()
        )))
    }

    /// Delete one item. Deleting a folder on a backend with implicit
    /// directories is a no-op once its children are gone.
    async fn delete(&self, item: &TemplateItem) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} cannot delete {}",
            self.label(),
            item.path()
        )))
    }

    /// Mirror the whole tree under `source` into this provider.
    ///
    /// Destination-only capability: the default implementation declines
    /// before touching either backend.
    async fn clone_from(
        &self,
        source: &dyn TemplatesProvider,
        progress: &dyn Progress,
    ) -> Result<SyncReport, SyncError> {
        let _ = (source, progress);
        Err(SyncError::ReadOnlyDestination(self.label().to_owned()))
    }
}
