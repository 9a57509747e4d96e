use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::document::ManifestDocument;
use super::filter::cut_json;
use crate::error::{SyncError, SyncResult};
use crate::source::cancellable;
use crate::source::figma_client::FigmaClient;

/// Where the manifest body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOrigin {
    Snapshot,
    Remote,
}

/// Load the manifest from the transient snapshot if one exists, otherwise
/// from the API. A fresh body is written to the snapshot path when no
/// snapshot is present, so a failed run can be retried offline.
pub async fn fetch_manifest(
    client: &FigmaClient,
    snapshot_path: &Path,
    properties_to_cut: &[String],
    token: &CancellationToken,
) -> SyncResult<(ManifestDocument, ManifestOrigin)> {
    let (json, origin) = if snapshot_path.exists() {
        let bytes = tokio::fs::read(snapshot_path)
            .await
            .map_err(|e| SyncError::io(snapshot_path, e))?;
        warn!(
            "manifest loaded from snapshot {}; remove the file if this is not intended",
            snapshot_path.display()
        );
        (into_text(bytes)?, ManifestOrigin::Snapshot)
    } else {
        let bytes = cancellable(token, client.file_json()).await?;
        info!("manifest downloaded for {} ({} bytes)", client.key(), bytes.len());
        (into_text(bytes.to_vec())?, ManifestOrigin::Remote)
    };

    if !snapshot_path.exists() {
        write_snapshot(snapshot_path, &json).await?;
    }

    let mut json = json;
    for property in properties_to_cut {
        let before = json.len();
        json = cut_json(&json, property);
        debug!("cut '{}' from manifest: {} -> {} bytes", property, before, json.len());
    }

    let document = ManifestDocument::parse(&json)?;
    info!("manifest parsed: {} nodes", document.len());
    Ok((document, origin))
}

fn into_text(bytes: Vec<u8>) -> SyncResult<String> {
    String::from_utf8(bytes).map_err(|e| SyncError::MalformedManifest(e.to_string()))
}

async fn write_snapshot(path: &Path, json: &str) -> SyncResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::io(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SyncError::io(path, e))
}

/// Remove the snapshot after a successful run.
pub fn discard_snapshot(path: &Path) -> SyncResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::io(path, e)),
    }
}
