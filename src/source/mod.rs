// Remote access: the document API, asset byte fetches, and their typed wrappers.

pub mod figma_client;
pub mod http_source;
pub mod traits;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult};

/// Run a network future unless `token` fires first.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> SyncResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        result = fut => result.map_err(SyncError::classify),
        _ = token.cancelled() => Err(SyncError::Cancelled),
    }
}
