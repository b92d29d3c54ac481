mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use template_sync::engine::{SyncEngine, SyncOptions};
use template_sync::item::TemplateItem;
use template_sync::progress::Progress;
use template_sync::provider::TemplatesProvider;
use template_sync_blob::{BlobProviderConfig, BlobTemplatesProvider};
use template_sync_fs::FsTemplatesProvider;
use template_sync_github::{GitHubProviderConfig, GitHubTemplatesProvider};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ProviderEntry};

#[derive(Parser)]
#[command(name = "template-sync")]
#[command(about = "Mirror provisioning templates between storage backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path (defaults to the XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror the configured source tree into the configured destination
    Sync {
        /// Log per-item copy and delete failures instead of aborting
        #[arg(long)]
        keep_going: bool,
    },

    /// List one directory as a provider sees it
    List {
        /// Directory within the tree ("" or "/" means the root)
        #[arg(default_value = "")]
        path: String,

        /// Which configured side to list
        #[arg(long, value_enum, default_value = "source")]
        from: Side,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Source,
    Destination,
}

/// Forwards engine progress lines into the log stream.
struct TracingProgress;

impl Progress for TracingProgress {
    fn log(&self, line: &str) {
        info!("{line}");
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn github_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN").ok()
}

fn build_provider(entry: &ProviderEntry) -> Result<Box<dyn TemplatesProvider>> {
    match entry {
        ProviderEntry::GitHub {
            owner,
            repo,
            branch,
            base_path,
        } => Ok(Box::new(GitHubTemplatesProvider::new(GitHubProviderConfig {
            owner: owner.clone(),
            repo: repo.clone(),
            branch: branch.clone(),
            base_path: base_path.clone(),
            token: github_token(),
            api_base_url: None,
        }))),

        ProviderEntry::Blob {
            container,
            connection_string,
        } => {
            let connection_string = connection_string
                .clone()
                .or_else(|| std::env::var("AZURE_STORAGE_CONNECTION_STRING").ok())
                .context(
                    "blob provider needs a connection_string or AZURE_STORAGE_CONNECTION_STRING",
                )?;
            let provider = BlobTemplatesProvider::new(BlobProviderConfig {
                connection_string,
                container: container.clone(),
            })?;
            Ok(Box::new(provider))
        }

        ProviderEntry::FileSystem { root } => Ok(Box::new(FsTemplatesProvider::new(root.clone()))),
    }
}

/// Cancel the returned token when the process receives Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current operation");
            handle.cancel();
        }
    });
    token
}

async fn run_sync(config: &AppConfig, keep_going: bool) -> Result<()> {
    let source = build_provider(&config.source)?;
    let destination = build_provider(&config.destination)?;

    info!("syncing {} into {}", source.label(), destination.label());

    let options = SyncOptions {
        force_full_resync: config.sync.force_full_resync,
        abort_on_error: config.sync.abort_on_error && !keep_going,
        cancel: Some(cancel_on_ctrl_c()),
    };

    let report = SyncEngine::new(source.as_ref(), destination.as_ref())
        .with_options(options)
        .run(&TracingProgress)
        .await?;

    info!(
        "sync complete: {} directories inspected, {} files copied, {} items deleted",
        report.directories, report.copied, report.deleted
    );

    if !report.failures.is_empty() {
        anyhow::bail!("{} items failed to sync", report.failures.len());
    }
    Ok(())
}

async fn run_list(config: &AppConfig, path: &str, from: Side) -> Result<()> {
    let entry = match from {
        Side::Source => &config.source,
        Side::Destination => &config.destination,
    };
    let provider = build_provider(entry)?;

    for item in provider.list(path).await? {
        match item {
            TemplateItem::Folder(path) => println!("{path}/"),
            TemplateItem::File(file) => println!("{}", file.path),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Sync { keep_going } => run_sync(&config, keep_going).await,
        Command::List { path, from } => run_list(&config, &path, from).await,
    }
}
