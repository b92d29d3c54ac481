use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::item::{FileItem, ItemPath, TemplateItem};
use crate::progress::Progress;
use crate::provider::{ProviderError, TemplatesProvider};

/// Errors that can abort a sync run. Per-item variants carry the path and
/// operation, with the backend's original error preserved underneath.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("destination '{0}' does not accept uploads")]
    ReadOnlyDestination(String),

    #[error("listing {path}: {source}")]
    List {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("copying {path}: {source}")]
    Copy {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("deleting {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: ProviderError,
    },

    #[error("sync cancelled")]
    Cancelled,
}

/// Tunables for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Always perform a full resync. The engine has no incremental mode;
    /// disabling this only logs a note and runs a full resync anyway.
    pub force_full_resync: bool,
    /// Abort the run on the first file copy or delete failure. When
    /// disabled, per-item failures are logged and collected in the report
    /// instead. Listing failures always abort: a directory that cannot be
    /// listed invalidates the whole diff at that level.
    pub abort_on_error: bool,
    /// Checked at every suspension point; cancelling aborts the run without
    /// destination-consistency guarantees. Re-running converges.
    pub cancel: Option<CancellationToken>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force_full_resync: true,
            abort_on_error: true,
            cancel: None,
        }
    }
}

/// Counts from a completed sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Directories reconciled (including the root).
    pub directories: u64,
    /// Files transferred from source to destination.
    pub copied: u64,
    /// Destination items removed (files and folders).
    pub deleted: u64,
    /// Non-fatal per-item failures, present only with `abort_on_error`
    /// disabled.
    pub failures: Vec<String>,
}

/// Mirrors a source provider's tree into a destination provider.
///
/// Reconciliation happens one directory at a time: both sides are listed,
/// source items are matched against destination items by path, files are
/// re-transferred unconditionally (no content-hash short-circuit; a
/// deliberate simplicity trade-off), folders recurse depth-first, and
/// whatever remains unmatched at the destination is deleted last.
///
/// There is no transactionality: an interrupted run can leave the
/// destination partially synchronized, and re-running from scratch converges
/// because the full diff is recomputed at every directory level.
pub struct SyncEngine<'a> {
    source: &'a dyn TemplatesProvider,
    destination: &'a dyn TemplatesProvider,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(source: &'a dyn TemplatesProvider, destination: &'a dyn TemplatesProvider) -> Self {
        Self {
            source,
            destination,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the mirror from the providers' roots.
    ///
    /// Fails upfront with [`SyncError::ReadOnlyDestination`] when the
    /// destination does not accept writes, before any listing or mutation.
    pub async fn run(&self, progress: &dyn Progress) -> Result<SyncReport, SyncError> {
        if !self.destination.supports_write() {
            return Err(SyncError::ReadOnlyDestination(
                self.destination.label().to_owned(),
            ));
        }

        if !self.options.force_full_resync {
            progress.log("incremental resync is not implemented; running a full resync");
        }

        let mut report = SyncReport::default();
        self.sync_directory(ItemPath::root(), progress, &mut report)
            .await?;
        Ok(report)
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        match &self.options.cancel {
            Some(token) if token.is_cancelled() => Err(SyncError::Cancelled),
            _ => Ok(()),
        }
    }

    fn sync_directory<'s>(
        &'s self,
        dir: ItemPath,
        progress: &'s dyn Progress,
        report: &'s mut SyncReport,
    ) -> BoxFuture<'s, Result<(), SyncError>> {
        Box::pin(async move {
            self.check_cancelled()?;
            progress.log(&format!("inspecting {}", display_dir(&dir)));
            report.directories += 1;

            let source_items = self.source.list(dir.as_str()).await.map_err(|e| {
                SyncError::List {
                    path: dir.to_string(),
                    source: e,
                }
            })?;
            let destination_items =
                self.destination.list(dir.as_str()).await.map_err(|e| {
                    SyncError::List {
                        path: dir.to_string(),
                        source: e,
                    }
                })?;

            // Destination entries not matched by a source item below are
            // orphans, deleted after all adds and updates at this level.
            let mut remaining: HashMap<ItemPath, TemplateItem> = destination_items
                .into_iter()
                .map(|item| (item.path().clone(), item))
                .collect();

            for item in source_items {
                self.check_cancelled()?;
                take_match(&mut remaining, item.path());

                match item {
                    TemplateItem::Folder(path) => {
                        self.sync_directory(path, progress, &mut *report).await?;
                    }
                    TemplateItem::File(file) => {
                        match self.copy_file(&file, progress).await {
                            Ok(()) => report.copied += 1,
                            Err(error) => self.record_failure(error, progress, report)?,
                        }
                    }
                }
            }

            for orphan in remaining.into_values() {
                self.check_cancelled()?;
                if let Err(error) = self.delete_tree(orphan, progress, &mut *report).await {
                    self.record_failure(error, progress, report)?;
                }
            }

            Ok(())
        })
    }

    async fn copy_file(
        &self,
        file: &FileItem,
        progress: &dyn Progress,
    ) -> Result<(), SyncError> {
        let content = self.source.download(file).await.map_err(|e| SyncError::Copy {
            path: file.path.to_string(),
            source: e,
        })?;

        self.destination
            .upload(&file.path, content)
            .await
            .map_err(|e| SyncError::Copy {
                path: file.path.to_string(),
                source: e,
            })?;

        progress.log(&format!("copied {}", file.path));
        Ok(())
    }

    /// Depth-first deletion: folder children are enumerated and removed
    /// before the folder entry itself, since most backends cannot delete a
    /// non-empty directory as a single operation.
    fn delete_tree<'s>(
        &'s self,
        item: TemplateItem,
        progress: &'s dyn Progress,
        report: &'s mut SyncReport,
    ) -> BoxFuture<'s, Result<(), SyncError>> {
        Box::pin(async move {
            self.check_cancelled()?;

            if let TemplateItem::Folder(path) = &item {
                let children =
                    self.destination.list(path.as_str()).await.map_err(|e| {
                        SyncError::List {
                            path: path.to_string(),
                            source: e,
                        }
                    })?;
                for child in children {
                    self.delete_tree(child, progress, &mut *report).await?;
                }
            }

            self.destination.delete(&item).await.map_err(|e| SyncError::Delete {
                path: item.path().to_string(),
                source: e,
            })?;

            progress.log(&format!("deleted {}", item.path()));
            report.deleted += 1;
            Ok(())
        })
    }

    fn record_failure(
        &self,
        error: SyncError,
        progress: &dyn Progress,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if self.options.abort_on_error
            || matches!(error, SyncError::List { .. } | SyncError::Cancelled)
        {
            return Err(error);
        }
        progress.log(&format!("warning: {error}"));
        report.failures.push(error.to_string());
        Ok(())
    }
}

/// Mark the destination entry matching `path` as still wanted. Exact path
/// equality first; percent-decoded equality as a fallback for backends that
/// hand back encoded keys.
fn take_match(remaining: &mut HashMap<ItemPath, TemplateItem>, path: &ItemPath) {
    if remaining.remove(path).is_some() {
        return;
    }

    let decoded = path.percent_decoded();
    let matched = remaining
        .keys()
        .find(|candidate| candidate.percent_decoded() == decoded)
        .cloned();
    if let Some(key) = matched {
        remaining.remove(&key);
    }
}

fn display_dir(path: &ItemPath) -> &str {
    if path.is_root() { "/" } else { path.as_str() }
}
