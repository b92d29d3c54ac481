use template_sync::engine::{SyncEngine, SyncError, SyncReport};
use template_sync::item::{FileItem, ItemPath, TemplateItem};
use template_sync::progress::Progress;
use template_sync::provider::{ProviderError, TemplatesProvider};
use template_sync::retry::RetryPolicy;
use tracing::debug;

use crate::connection::BlobConnection;
use crate::list_xml::parse_list_page;

const API_VERSION: &str = "2021-08-06";

/// Configuration for an Azure Blob Storage provider.
#[derive(Debug, Clone)]
pub struct BlobProviderConfig {
    pub connection_string: String,
    pub container: String,
}

/// Serves templates from blobs in an Azure Storage container, and accepts
/// uploads and deletions so it can be a mirror destination.
///
/// Directories are virtual: they exist only as blob-name prefixes, so
/// listing a path with no blobs beneath it yields an empty vector, and
/// deleting a folder item is a no-op once its blobs are gone. Prefix entries
/// returned by the service carry a trailing delimiter, stripped here to the
/// canonical path form.
pub struct BlobTemplatesProvider {
    label: String,
    connection: BlobConnection,
    container: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl BlobTemplatesProvider {
    pub fn new(config: BlobProviderConfig) -> Result<Self, ProviderError> {
        let connection = BlobConnection::parse(&config.connection_string)?;
        Ok(Self {
            label: format!("blob:{}", config.container),
            connection,
            container: config.container,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy used for downloads.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.connection.endpoint, self.container)
    }

    fn blob_url(&self, path: &ItemPath) -> String {
        let mut url = format!("{}/{}", self.container_url(), encode_path(path.as_str()));
        if let Some(sas) = &self.connection.sas {
            url.push('?');
            url.push_str(sas);
        }
        url
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> String {
        let mut url = format!(
            "{}?restype=container&comp=list&delimiter=/",
            self.container_url()
        );
        if !prefix.is_empty() {
            url.push_str("&prefix=");
            url.push_str(&encode_path(prefix));
        }
        if let Some(marker) = marker {
            url.push_str("&marker=");
            url.push_str(&encode_path(marker));
        }
        if let Some(sas) = &self.connection.sas {
            url.push('&');
            url.push_str(sas);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url).header("x-ms-version", API_VERSION)
    }
}

#[async_trait::async_trait]
impl TemplatesProvider for BlobTemplatesProvider {
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

        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.list_url(&prefix, marker.as_deref());
            let response = self
                .request(reqwest::Method::GET, &url)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::NotFound(format!(
                    "container {}",
                    self.container
                )));
            }
            if !response.status().is_success() {
                return Err(ProviderError::Network(format!(
                    "HTTP {} listing prefix {prefix:?}",
                    response.status()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            let page = parse_list_page(&body)?;

            for virtual_dir in page.prefixes {
                // ItemPath normalization strips the trailing delimiter.
                items.push(TemplateItem::Folder(ItemPath::new(virtual_dir)));
            }
            for blob in page.blobs {
                let blob_path = ItemPath::new(&blob.name);
                items.push(TemplateItem::File(FileItem {
                    download_url: self.blob_url(&blob_path),
                    path: blob_path,
                    size: blob.size,
                }));
            }

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!("listed {} entries under {path:?}", items.len());
        Ok(items)
    }

    async fn download(&self, file: &FileItem) -> Result<Vec<u8>, ProviderError> {
        self.retry
            .run(
                || async {
                    let response = self
                        .request(reqwest::Method::GET, &file.download_url)
                        .send()
                        .await
                        .map_err(|e| ProviderError::Network(e.to_string()))?;

                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Err(ProviderError::NotFound(file.path.to_string()));
                    }
                    if !response.status().is_success() {
                        return Err(ProviderError::Network(format!(
                            "HTTP {} downloading {}",
                            response.status(),
                            file.path
                        )));
                    }

                    response
                        .bytes()
                        .await
                        .map(|bytes| bytes.to_vec())
                        .map_err(|e| ProviderError::Network(e.to_string()))
                },
                |e| matches!(e, ProviderError::Network(_)),
            )
            .await
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn upload(&self, path: &ItemPath, content: Vec<u8>) -> Result<(), ProviderError> {
        let url = self.blob_url(path);
        let response = self
            .request(reqwest::Method::PUT, &url)
            .header("x-ms-blob-type", "BlockBlob")
            .body(content)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(ProviderError::Network(format!(
                "HTTP {} uploading {path}",
                response.status()
            )));
        }

        debug!("uploaded {path}");
        Ok(())
    }

    async fn delete(&self, item: &TemplateItem) -> Result<(), ProviderError> {
        // Virtual directories vanish with their last blob.
        let TemplateItem::File(file) = item else {
            return Ok(());
        };

        let response = self
            .request(reqwest::Method::DELETE, &self.blob_url(&file.path))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        // An already-absent blob is a successful delete.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            debug!("deleted {}", file.path);
            Ok(())
        } else {
            Err(ProviderError::Network(format!(
                "HTTP {status} deleting {}",
                file.path
            )))
        }
    }

    async fn clone_from(
        &self,
        source: &dyn TemplatesProvider,
        progress: &dyn Progress,
    ) -> Result<SyncReport, SyncError> {
        SyncEngine::new(source, self).run(progress).await
    }
}

/// Percent-encode a blob path for use in a URL, preserving `/` separators.
fn encode_path(path: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(path.len());

    for &byte in path.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push(HEX[(byte >> 4) as usize] as char);
                out.push(HEX[(byte & 0xf) as usize] as char);
            }
        }
    }

    out
}
