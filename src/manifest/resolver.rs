use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::document::ManifestDocument;
use crate::error::SyncResult;
use crate::source::cancellable;
use crate::source::figma_client::FigmaClient;

/// Fetch component definitions referenced by instances but absent from the
/// tree and splice them under the document root. Returns how many were added.
///
/// Ids the server does not know are skipped; ids already present are not
/// requested again.
pub async fn resolve_missing(
    document: &mut ManifestDocument,
    missing: &BTreeSet<String>,
    client: &FigmaClient,
    token: &CancellationToken,
) -> SyncResult<usize> {
    let ids: Vec<String> = missing
        .iter()
        .filter(|id| !document.contains(id))
        .cloned()
        .collect();
    if ids.is_empty() {
        return Ok(0);
    }

    info!("resolving {} missing components", ids.len());
    let bodies = cancellable(token, client.nodes(&ids)).await?;

    let mut added = 0;
    for (id, body) in bodies {
        if document.splice_component(body.document, body.styles) {
            added += 1;
        } else {
            debug!("component {} already present, skipping", id);
        }
    }

    let skipped = ids.len().saturating_sub(added);
    if skipped > 0 {
        debug!("{} missing components were not returned by the server", skipped);
    }
    Ok(added)
}
