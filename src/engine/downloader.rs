// Conditional asset downloader: a fixed pool of workers fetching asset bytes with ETag preconditions.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::collector::RetentionSet;
use super::remap::RemapCache;
use super::stats::SyncStats;
use super::storage::{write_atomic, AssetStorage, ResolvedPath};
use crate::error::{SyncError, SyncResult};
use crate::source::traits::{ConditionalFetch, DesignSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The cached validator matched; the file was left alone.
    Unchanged,
    /// Fresh bytes were written.
    Replaced,
    /// No usable payload (no URL, 404, or a failed fetch or write).
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub id: String,
    pub local_path: String,
    pub absolute_path: PathBuf,
    pub outcome: DownloadOutcome,
}

/// Called with the id and location of every freshly written asset.
pub type ImportHook = Arc<dyn Fn(&str, &ResolvedPath) + Send + Sync>;

/// Everything a worker needs, cheap to clone into each task.
#[derive(Clone)]
struct WorkerContext {
    source: Arc<dyn DesignSource>,
    storage: Arc<dyn AssetStorage>,
    remaps: Arc<RemapCache>,
    retention: Arc<RetentionSet>,
    stats: Arc<SyncStats>,
    token: CancellationToken,
}

pub struct Downloader {
    ctx: WorkerContext,
    max_concurrency: usize,
}

impl Downloader {
    pub fn new(
        source: Arc<dyn DesignSource>,
        storage: Arc<dyn AssetStorage>,
        remaps: Arc<RemapCache>,
        retention: Arc<RetentionSet>,
        stats: Arc<SyncStats>,
        max_concurrency: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            ctx: WorkerContext {
                source,
                storage,
                remaps,
                retention,
                stats,
                token,
            },
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Fetch every `(id, url)` pair with at most `max_concurrency` requests in
    /// flight. Items without a URL are recorded as missing. Each processed
    /// item's path is marked in the retention set whatever the outcome.
    ///
    /// Returns `Cancelled` if the token fired before the batch finished.
    pub async fn download_all(
        &self,
        items: Vec<(String, Option<String>)>,
        extension: &'static str,
        on_fresh: ImportHook,
    ) -> SyncResult<Vec<DownloadRecord>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let workers = self.max_concurrency.min(total);
        debug!("downloading {} .{} assets with {} workers", total, extension, workers);

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let ctx = self.ctx.clone();
            let queue = Arc::clone(&queue);
            let hook = Arc::clone(&on_fresh);
            set.spawn(async move {
                let mut records = Vec::new();
                loop {
                    if ctx.token.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().pop_front();
                    let Some((id, url)) = next else {
                        break;
                    };
                    match ctx.process(&id, url.as_deref(), extension, &hook).await {
                        Some(record) => records.push(record),
                        None => break,
                    }
                }
                records
            });
        }

        let mut records = Vec::with_capacity(total);
        let mut worker_failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    warn!("download worker failed: {}", e);
                    worker_failure = Some(e.to_string());
                }
            }
        }

        if self.ctx.token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        // A lost worker means lost marks; the run must not reach the sweep.
        if let Some(reason) = worker_failure {
            return Err(SyncError::TransientNetwork(format!("download worker failed: {}", reason)));
        }
        Ok(records)
    }
}

impl WorkerContext {
    /// Handle one item. `None` means the run was cancelled before it finished.
    async fn process(
        &self,
        id: &str,
        url: Option<&str>,
        extension: &str,
        hook: &ImportHook,
    ) -> Option<DownloadRecord> {
        if self.token.is_cancelled() {
            return None;
        }

        let resolved = match self.storage.resolve_asset_path(id, extension) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("cannot resolve local path for {}: {}", id, e);
                self.stats.record_missing();
                return Some(DownloadRecord {
                    id: id.to_string(),
                    local_path: String::new(),
                    absolute_path: PathBuf::new(),
                    outcome: DownloadOutcome::Missing,
                });
            }
        };
        self.retention.mark(&resolved.absolute);

        let outcome = match url {
            Some(url) => self.fetch(id, url, &resolved, hook).await?,
            None => {
                warn!("no download url for {}", id);
                DownloadOutcome::Missing
            }
        };

        match outcome {
            DownloadOutcome::Unchanged => self.stats.record_unchanged(),
            DownloadOutcome::Missing => self.stats.record_missing(),
            DownloadOutcome::Replaced => {}
        }
        debug!("{} -> {} ({:?})", id, resolved.relative, outcome);

        Some(DownloadRecord {
            id: id.to_string(),
            local_path: resolved.relative,
            absolute_path: resolved.absolute,
            outcome,
        })
    }

    async fn fetch(
        &self,
        id: &str,
        url: &str,
        resolved: &ResolvedPath,
        hook: &ImportHook,
    ) -> Option<DownloadOutcome> {
        let etag = if resolved.exists {
            self.remaps.version_tag(id)
        } else {
            None
        };

        self.stats.increment_workers();
        let fetched = tokio::select! {
            result = self.source.fetch_conditional(url, etag.as_deref()) => Some(result),
            _ = self.token.cancelled() => None,
        };
        self.stats.decrement_workers();

        let Some(fetched) = fetched else {
            debug!("download of {} cancelled in flight", id);
            return None;
        };

        let outcome = match fetched {
            Ok(ConditionalFetch::NotModified) => DownloadOutcome::Unchanged,
            Ok(ConditionalFetch::Fresh { bytes, etag }) => {
                let len = bytes.len() as u64;
                let target = resolved.absolute.clone();
                let written =
                    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes)).await;
                match written {
                    Ok(Ok(())) => {
                        self.remaps.record_version(id, etag);
                        self.stats.record_replaced(len);
                        (**hook)(id, resolved);
                        DownloadOutcome::Replaced
                    }
                    Ok(Err(e)) => {
                        warn!("failed to write {}: {}", resolved.relative, e);
                        DownloadOutcome::Missing
                    }
                    Err(e) => {
                        warn!("write task for {} failed: {}", resolved.relative, e);
                        DownloadOutcome::Missing
                    }
                }
            }
            Err(e) => {
                match SyncError::classify(e) {
                    SyncError::NotFound(_) => warn!("asset {} not found at {}", id, url),
                    other => warn!("asset {} download failed: {}", id, other),
                }
                DownloadOutcome::Missing
            }
        };
        Some(outcome)
    }
}
