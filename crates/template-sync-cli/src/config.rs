use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level application configuration: one source tree, one destination
/// tree, and sync tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub source: ProviderEntry,
    pub destination: ProviderEntry,
    #[serde(default)]
    pub sync: SyncSection,
}

/// One configured storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ProviderEntry {
    /// GitHub repository, addressed through the contents API. The access
    /// token comes from `GITHUB_TOKEN`.
    #[serde(rename = "github")]
    GitHub {
        owner: String,
        repo: String,
        #[serde(default = "default_branch")]
        branch: String,
        base_path: Option<String>,
    },

    /// Azure Blob Storage container. The connection string may be omitted
    /// in favor of `AZURE_STORAGE_CONNECTION_STRING`.
    #[serde(rename = "blob")]
    Blob {
        container: String,
        connection_string: Option<String>,
    },

    /// Local directory tree (source only).
    #[serde(rename = "filesystem")]
    FileSystem { root: PathBuf },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSection {
    #[serde(default = "default_true")]
    pub force_full_resync: bool,
    #[serde(default = "default_true")]
    pub abort_on_error: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            force_full_resync: true,
            abort_on_error: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "main".into()
}

/// Config file path: `~/.config/template-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("template-sync").join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_path().context("could not determine config directory")?,
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;

    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))
}
