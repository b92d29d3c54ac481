use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::engine::{SyncEngine, SyncError, SyncReport};
use crate::item::{FileItem, ItemPath, TemplateItem};
use crate::progress::Progress;
use crate::provider::{ProviderError, TemplatesProvider};

/// In-memory provider for testing. Stores file content keyed by path and
/// derives folder listings from key prefixes, like the blob backend does.
pub struct MemoryProvider {
    label: String,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    writable: bool,
}

impl MemoryProvider {
    /// A read-only tree, usable as a sync source.
    pub fn source(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            files: Mutex::new(BTreeMap::new()),
            writable: false,
        }
    }

    /// A write-capable tree, usable as a sync destination.
    pub fn destination(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            files: Mutex::new(BTreeMap::new()),
            writable: true,
        }
    }

    pub fn insert(&self, path: &str, content: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(ItemPath::new(path).as_str().to_owned(), content);
    }

    /// Snapshot of all stored files.
    pub fn contents(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TemplatesProvider for MemoryProvider {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list(&self, path: &str) -> Result<Vec<TemplateItem>, ProviderError> {
        let dir = ItemPath::new(path);
        let prefix = if dir.is_root() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let files = self.files.lock().unwrap();
        let mut folders: BTreeSet<String> = BTreeSet::new();
        let mut items = Vec::new();

        for (key, content) in files.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.find('/') {
                Some(idx) => {
                    folders.insert(format!("{prefix}{}", &rest[..idx]));
                }
                None => {
                    items.push(TemplateItem::File(FileItem {
                        path: ItemPath::new(key),
                        download_url: format!("mem://{}/{key}", self.label),
                        size: Some(content.len() as u64),
                    }));
                }
            }
        }

        let mut listing: Vec<TemplateItem> = folders
            .into_iter()
            .map(|folder| TemplateItem::Folder(ItemPath::new(folder)))
            .collect();
        listing.extend(items);
        Ok(listing)
    }

    async fn download(&self, file: &FileItem) -> Result<Vec<u8>, ProviderError> {
        self.files
            .lock()
            .unwrap()
            .get(file.path.as_str())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(file.path.to_string()))
    }

    fn supports_write(&self) -> bool {
        self.writable
    }

    async fn upload(&self, path: &ItemPath, content: Vec<u8>) -> Result<(), ProviderError> {
        if !self.writable {
            return Err(ProviderError::Unsupported(format!(
                "{} cannot store {path}",
                self.label
            )));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.as_str().to_owned(), content);
        Ok(())
    }

    async fn delete(&self, item: &TemplateItem) -> Result<(), ProviderError> {
        if !self.writable {
            return Err(ProviderError::Unsupported(format!(
                "{} cannot delete {}",
                self.label,
                item.path()
            )));
        }
        if let TemplateItem::File(file) = item {
            self.files.lock().unwrap().remove(file.path.as_str());
        }
        // Folders are implicit: they vanish with their last file.
        Ok(())
    }

    async fn clone_from(
        &self,
        source: &dyn TemplatesProvider,
        progress: &dyn Progress,
    ) -> Result<SyncReport, SyncError> {
        SyncEngine::new(source, self).run(progress).await
    }
}

#[cfg(test)]
mod tests {
    use crate::progress::NoProgress;

    use super::*;

    #[tokio::test]
    async fn lists_root_children_one_level_deep() {
        let provider = MemoryProvider::source("mem");
        provider.insert("a.txt", b"a".to_vec());
        provider.insert("sub/b.txt", b"b".to_vec());
        provider.insert("sub/deep/c.txt", b"c".to_vec());

        let items = provider.list("").await.unwrap();

        let paths: Vec<&str> = items.iter().map(|i| i.path().as_str()).collect();
        assert_eq!(paths, vec!["sub", "a.txt"]);
    }

    #[tokio::test]
    async fn lists_subdirectory_children() {
        let provider = MemoryProvider::source("mem");
        provider.insert("sub/b.txt", b"b".to_vec());
        provider.insert("sub/deep/c.txt", b"c".to_vec());

        let items = provider.list("sub").await.unwrap();

        let paths: Vec<&str> = items.iter().map(|i| i.path().as_str()).collect();
        assert_eq!(paths, vec!["sub/deep", "sub/b.txt"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let provider = MemoryProvider::source("mem");
        assert!(provider.list("nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_roundtrip() {
        let provider = MemoryProvider::source("mem");
        provider.insert("a.txt", b"hello".to_vec());

        let items = provider.list("").await.unwrap();
        let TemplateItem::File(file) = &items[0] else {
            panic!("expected a file");
        };
        assert_eq!(provider.download(file).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn source_rejects_uploads() {
        let provider = MemoryProvider::source("mem");
        let result = provider
            .upload(&ItemPath::new("a.txt"), b"x".to_vec())
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn clone_from_mirrors_another_provider() {
        let source = MemoryProvider::source("src");
        source.insert("a.txt", b"hello".to_vec());
        let destination = MemoryProvider::destination("dst");

        let report = destination.clone_from(&source, &NoProgress).await.unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(destination.contents()["a.txt"], b"hello");
    }
}
