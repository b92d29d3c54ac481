use serde::Deserialize;

/// One entry from GitHub's repository contents API.
/// `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`
#[derive(Debug, Deserialize)]
pub struct ContentEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub download_url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}
