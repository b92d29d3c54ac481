use std::io::ErrorKind;
use std::path::PathBuf;

use template_sync::engine::{SyncError, SyncReport};
use template_sync::item::{FileItem, ItemPath, TemplateItem};
use template_sync::progress::Progress;
use template_sync::provider::{ProviderError, TemplatesProvider};
use template_sync::retry::RetryPolicy;

/// Serves templates from a local directory tree.
///
/// Local trees are sync sources only: this provider declines to act as a
/// mirror destination. Unlike the remote backends, listing a directory that
/// does not exist is an explicit [`ProviderError::NotFound`]: the
/// filesystem has real directory objects, so absence is meaningful.
pub struct FsTemplatesProvider {
    label: String,
    root: PathBuf,
    retry: RetryPolicy,
}

impl FsTemplatesProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            label: format!("fs:{}", root.display()),
            root,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy used for reads that hit transient sharing
    /// violations.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn resolve(&self, path: &ItemPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str())
        }
    }
}

#[async_trait::async_trait]
impl TemplatesProvider for FsTemplatesProvider {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list(&self, path: &str) -> Result<Vec<TemplateItem>, ProviderError> {
        let dir = ItemPath::new(path);
        let full = self.resolve(&dir);

        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(full.display().to_string()));
            }
            Err(e) => return Err(ProviderError::Io(e.to_string())),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProviderError::Io(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let item_path = dir.join(&name);
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ProviderError::Io(e.to_string()))?;

            if file_type.is_dir() {
                items.push(TemplateItem::Folder(item_path));
            } else if file_type.is_file() {
                let size = entry.metadata().await.ok().map(|m| m.len());
                items.push(TemplateItem::File(FileItem {
                    download_url: self.resolve(&item_path).display().to_string(),
                    path: item_path,
                    size,
                }));
            }
            // Symlinks and special files are skipped.
        }

        items.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(items)
    }

    async fn download(&self, file: &FileItem) -> Result<Vec<u8>, ProviderError> {
        let path = PathBuf::from(&file.download_url);

        self.retry
            .run(
                || async { tokio::fs::read(&path).await },
                |e: &std::io::Error| e.kind() != ErrorKind::NotFound,
            )
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ProviderError::NotFound(file.path.to_string()),
                _ => ProviderError::Io(e.to_string()),
            })
    }

    async fn clone_from(
        &self,
        _source: &dyn TemplatesProvider,
        _progress: &dyn Progress,
    ) -> Result<SyncReport, SyncError> {
        Err(SyncError::ReadOnlyDestination(self.label.clone()))
    }
}

#[cfg(test)]
mod tests {
    use template_sync::progress::NoProgress;
    use template_sync::test_support::MemoryProvider;

    use super::*;

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn lists_files_and_folders_with_relative_paths() {
        let dir = tree(&[("a.txt", "hello"), ("sub/b.txt", "world")]);
        let provider = FsTemplatesProvider::new(dir.path());

        let items = provider.list("").await.unwrap();

        let paths: Vec<&str> = items.iter().map(|i| i.path().as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub"]);
        assert!(!items[0].is_folder());
        assert!(items[1].is_folder());
    }

    #[tokio::test]
    async fn lists_subdirectory_children() {
        let dir = tree(&[("sub/b.txt", "world")]);
        let provider = FsTemplatesProvider::new(dir.path());

        let items = provider.list("sub").await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path().as_str(), "sub/b.txt");
    }

    #[tokio::test]
    async fn missing_directory_is_an_explicit_error() {
        let dir = tree(&[]);
        let provider = FsTemplatesProvider::new(dir.path());

        let result = provider.list("nowhere").await;

        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn download_reads_file_content() {
        let dir = tree(&[("a.txt", "hello")]);
        let provider = FsTemplatesProvider::new(dir.path());

        let items = provider.list("").await.unwrap();
        let TemplateItem::File(file) = &items[0] else {
            panic!("expected a file");
        };

        assert_eq!(provider.download(file).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn download_of_missing_file_is_not_retried() {
        let dir = tree(&[]);
        let provider = FsTemplatesProvider::new(dir.path());

        let file = FileItem {
            path: ItemPath::new("gone.txt"),
            download_url: dir.path().join("gone.txt").display().to_string(),
            size: None,
        };

        let result = provider.download(&file).await;
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn declines_to_be_a_clone_destination() {
        let dir = tree(&[]);
        let provider = FsTemplatesProvider::new(dir.path());
        let source = MemoryProvider::source("src");

        let result = provider.clone_from(&source, &NoProgress).await;

        assert!(matches!(result, Err(SyncError::ReadOnlyDestination(_))));
    }

    #[tokio::test]
    async fn uploads_are_unsupported() {
        let dir = tree(&[]);
        let provider = FsTemplatesProvider::new(dir.path());

        let result = provider
            .upload(&ItemPath::new("a.txt"), b"x".to_vec())
            .await;

        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }
}
