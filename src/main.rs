use std::path::PathBuf;

use clap::Parser;

use figma_sync_engine::api::logging::init_tracing;
use figma_sync_engine::api::sync_api::start_sync;
use figma_sync_engine::config::{SyncConfig, DEFAULT_API_BASE, DEFAULT_SNAPSHOT_PATH};
use figma_sync_engine::engine::session::SyncRun;

#[derive(Parser)]
#[command(name = "figma-sync")]
#[command(about = "Sync a Figma document's images into a local folder")]
struct Cli {
    /// Remote document key
    #[arg(short, long)]
    key: String,

    /// Local document name, used for the remap file
    #[arg(short, long)]
    name: String,

    /// Folder receiving Images/ and the remap file
    #[arg(short, long, default_value = ".")]
    folder: PathBuf,

    /// Personal access token
    #[arg(long, env = "FIGMA_TOKEN", hide_env_values = true)]
    token: String,

    /// Only fetch and plan the manifest, skip asset downloads
    #[arg(long)]
    no_images: bool,

    /// Manifest snapshot path; an existing snapshot is reused instead of fetching
    #[arg(long, default_value = DEFAULT_SNAPSHOT_PATH)]
    snapshot: PathBuf,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Extra font directory (repeatable)
    #[arg(long = "font-dir")]
    font_dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = SyncConfig {
        api_base: cli.api_base,
        token: cli.token,
        document_key: cli.key,
        name: cli.name,
        folder: cli.folder,
        snapshot_path: cli.snapshot,
        download_images: !cli.no_images,
        font_dirs: cli.font_dirs,
        ..SyncConfig::default()
    };

    let handle = start_sync(config)?;
    let token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });

    match handle.wait().await? {
        SyncRun::Completed(outcome) => {
            tracing::info!(
                "{} assets referenced, {} files deleted",
                outcome.assets.len(),
                outcome.deleted.len()
            );
        }
        SyncRun::NotFound(what) => tracing::warn!("nothing synced, {} not found", what),
        SyncRun::Cancelled => tracing::warn!("nothing swept, run was cancelled"),
    }

    Ok(())
}
