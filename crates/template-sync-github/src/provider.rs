use std::time::{Duration, SystemTime, UNIX_EPOCH};

use template_sync::item::{FileItem, ItemPath, TemplateItem};
use template_sync::provider::{ProviderError, TemplatesProvider};
use template_sync::retry::RetryPolicy;
use tracing::{debug, warn};

use crate::contents::ContentEntry;

/// Ceiling on server-reported rate-limit reset waits.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Hard stop for pagination, far beyond any real template directory.
const MAX_PAGES: u32 = 100;

/// Configuration for a GitHub repository provider.
#[derive(Debug, Clone)]
pub struct GitHubProviderConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub base_path: Option<String>,
    pub token: Option<String>,
    pub api_base_url: Option<String>,
}

/// Serves templates from a GitHub repository via the contents API.
///
/// Source-only. Listing a path the repository does not contain returns an
/// empty vector (the API models directories implicitly). Large directories
/// are paginated via the `Link` header; throttled responses are retried
/// after the server-reported reset time.
pub struct GitHubTemplatesProvider {
    config: GitHubProviderConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GitHubTemplatesProvider {
    pub fn new(config: GitHubProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy used for downloads and throttled listings.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.github.com")
    }

    fn base_path(&self) -> Option<&str> {
        self.config
            .base_path
            .as_deref()
            .map(|b| b.trim_matches('/'))
            .filter(|b| !b.is_empty())
    }

    fn contents_url(&self, path: &str) -> String {
        let rel = path.trim_matches('/');
        let repo_path = match (self.base_path(), rel.is_empty()) {
            (Some(base), true) => base.to_owned(),
            (Some(base), false) => format!("{base}/{rel}"),
            (None, _) => rel.to_owned(),
        };

        format!(
            "{}/repos/{}/{}/contents/{}?ref={}&per_page=100",
            self.api_base(),
            self.config.owner,
            self.config.repo,
            repo_path,
            self.config.branch,
        )
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("User-Agent", "template-sync")
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.config.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        req
    }

    /// Strip the configured base_path prefix from a repository-relative path.
    fn strip_base_path<'a>(&self, full_path: &'a str) -> Option<&'a str> {
        match self.base_path() {
            Some(base) => full_path
                .strip_prefix(base)
                .and_then(|rest| rest.strip_prefix('/')),
            None => Some(full_path),
        }
    }

    fn to_item(&self, entry: ContentEntry) -> Option<TemplateItem> {
        let relative = self.strip_base_path(&entry.path)?;
        let path = ItemPath::new(relative);

        match entry.entry_type.as_str() {
            "dir" => Some(TemplateItem::Folder(path)),
            "file" => Some(TemplateItem::File(FileItem {
                path,
                download_url: entry.download_url?,
                size: entry.size,
            })),
            // Symlinks and submodules have no mirrored representation.
            _ => None,
        }
    }

    /// Issue one GET, backing off until the reported reset time on a
    /// throttled response. Escalates to `RateLimited` only after the retry
    /// budget is spent.
    async fn get_with_backoff(&self, url: &str) -> Result<reqwest::Response, ProviderError> {
        let mut attempt = 1u32;
        loop {
            let response = self
                .build_request(url)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            if !is_rate_limited(&response) {
                return Ok(response);
            }

            if attempt >= self.retry.attempts {
                return Err(ProviderError::RateLimited(format!(
                    "GET {url} still throttled after {attempt} attempts"
                )));
            }

            let delay = rate_limit_delay(&response).unwrap_or(self.retry.delay);
            debug!("rate limited on {url}, retrying in {delay:?}");
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl TemplatesProvider for GitHubTemplatesProvider {
    fn label(&self) -> &str {
        &self.config.repo
    }

    async fn list(&self, path: &str) -> Result<Vec<TemplateItem>, ProviderError> {
        let mut url = self.contents_url(path);
        let mut items = Vec::new();
        let mut pages = 0u32;

        loop {
            let response = self.get_with_backoff(&url).await?;

            // Directories exist implicitly: an absent path is an empty one.
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }

            if !response.status().is_success() {
                return Err(ProviderError::Network(format!(
                    "HTTP {} listing {}",
                    response.status(),
                    url
                )));
            }

            let next = next_page_url(response.headers());

            let entries: Vec<ContentEntry> = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;

            items.extend(entries.into_iter().filter_map(|entry| self.to_item(entry)));

            pages += 1;
            match next {
                Some(next_url) if pages < MAX_PAGES => url = next_url,
                Some(_) => {
                    warn!("stopped following pagination after {MAX_PAGES} pages for {path}");
                    break;
                }
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
                    let response = self.get_with_backoff(&file.download_url).await?;

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
}

fn is_rate_limited(response: &reqwest::Response) -> bool {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != reqwest::StatusCode::FORBIDDEN {
        return false;
    }

    let headers = response.headers();
    headers.contains_key("retry-after")
        || headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0")
}

fn rate_limit_delay(response: &reqwest::Response) -> Option<Duration> {
    let headers = response.headers();

    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs).min(MAX_BACKOFF));
    }

    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();

    Some(Duration::from_secs(reset.saturating_sub(now)).min(MAX_BACKOFF))
}

/// Extract the `rel="next"` target from a `Link` header, if any.
fn next_page_url(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;

    for part in link.split(',') {
        let mut sections = part.split(';');
        let Some(url_part) = sections.next() else {
            continue;
        };
        let url = url_part.trim().trim_start_matches('<').trim_end_matches('>');
        if sections.any(|s| s.trim() == "rel=\"next\"") {
            return Some(url.to_owned());
        }
    }

    None
}
