use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::engine::session::{SyncRun, SyncSession};
use crate::engine::stats::StatsSnapshot;
use crate::error::{SyncError, SyncResult};
use crate::source::traits::DesignSource;

/// A run in progress on the tokio runtime.
pub struct SyncHandle {
    session: Arc<SyncSession>,
    task: JoinHandle<SyncResult<SyncRun>>,
}

impl SyncHandle {
    /// Request cancellation. Downloads in flight are abandoned and the sweep is skipped.
    pub fn cancel(&self) {
        self.session.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.session.cancel_token()
    }

    /// Current counters and phase of the run.
    pub fn watch_stats(&self) -> StatsSnapshot {
        self.session.snapshot()
    }

    pub async fn wait(self) -> SyncResult<SyncRun> {
        self.task
            .await
            .map_err(|e| SyncError::TransientNetwork(format!("sync task failed: {}", e)))?
    }
}

/// Synchronize one document against the HTTP API and wait for the result.
pub async fn sync_document(config: SyncConfig) -> SyncResult<SyncRun> {
    SyncSession::from_config(config)?.run().await
}

/// Start a run against the HTTP API in the background.
pub fn start_sync(config: SyncConfig) -> SyncResult<SyncHandle> {
    Ok(spawn(SyncSession::from_config(config)?))
}

/// Start a run against an explicit source in the background.
pub fn start_sync_with_source(
    config: SyncConfig,
    source: Arc<dyn DesignSource>,
) -> SyncResult<SyncHandle> {
    Ok(spawn(SyncSession::new(config, source)?))
}

fn spawn(session: SyncSession) -> SyncHandle {
    let session = Arc::new(session);
    let runner = Arc::clone(&session);
    let task = tokio::spawn(async move { runner.run().await });
    SyncHandle { session, task }
}
