// Sync session: one synchronization run, from manifest fetch to garbage collection.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collector::{GarbageCollector, RetentionSet};
use super::downloader::{DownloadRecord, Downloader, ImportHook};
use super::gradient::write_gradient;
use super::planner::{discover_missing, AssetPlan, AssetRequirement, Planner};
use super::remap::RemapCache;
use super::stats::{StatsSnapshot, SyncPhase, SyncStats};
use super::storage::{AssetStorage, DirectoryStorage, ResolvedPath};
use crate::config::{SyncConfig, MANAGED_EXTENSIONS};
use crate::error::{SyncError, SyncResult};
use crate::manifest::document::ManifestDocument;
use crate::manifest::fetcher::{discard_snapshot, fetch_manifest};
use crate::manifest::resolver::resolve_missing;
use crate::source::cancellable;
use crate::source::figma_client::{FigmaClient, RenderFormat};
use crate::source::http_source::HttpSource;
use crate::source::traits::DesignSource;

/// A vector asset to import, with the node size it should rasterize to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgImport {
    pub path: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Files written this run, grouped the way the host post-processes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
    pub png: Vec<PathBuf>,
    pub svg: Vec<SvgImport>,
    pub gradients: Vec<PathBuf>,
}

impl ImportBatch {
    fn sort(&mut self) {
        self.png.sort();
        self.svg.sort_by(|a, b| a.path.cmp(&b.path));
        self.gradients.sort();
    }
}

/// Everything the markup generator needs after a completed run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub document: ManifestDocument,
    /// Requirement id to the local path markup should reference.
    pub assets: BTreeMap<String, String>,
    pub imports: ImportBatch,
    /// Per-asset download outcomes, ordered by id.
    pub downloads: Vec<DownloadRecord>,
    pub deleted: Vec<PathBuf>,
    pub stats: StatsSnapshot,
}

#[derive(Debug)]
pub enum SyncRun {
    Completed(SyncOutcome),
    /// The remote document (or a required node) does not exist.
    NotFound(String),
    Cancelled,
}

pub struct SyncSession {
    config: SyncConfig,
    source: Arc<dyn DesignSource>,
    token: CancellationToken,
    stats: Arc<SyncStats>,
}

impl SyncSession {
    /// Session over an explicit source (a mock in tests, HTTP in production).
    pub fn new(config: SyncConfig, source: Arc<dyn DesignSource>) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            token: CancellationToken::new(),
            stats: Arc::new(SyncStats::new()),
        })
    }

    /// Session talking to the configured API over HTTP.
    pub fn from_config(config: SyncConfig) -> SyncResult<Self> {
        let source = HttpSource::new(
            config.api_base.clone(),
            config.token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .map_err(|e| SyncError::InvalidConfig(format!("http client: {}", e)))?;
        Self::new(config, Arc::new(source))
    }

    /// Token observed by every network call and download worker of this run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the pipeline. Missing documents and cancellation are reported as
    /// `SyncRun` variants; everything else fatal is returned as an error.
    pub async fn run(&self) -> SyncResult<SyncRun> {
        let t0 = Instant::now();
        match self.run_inner().await {
            Ok(outcome) => {
                let s = &outcome.stats;
                debug!("{} download records", outcome.downloads.len());
                info!(
                    "figma update {} OK: replaced={} unchanged={} missing={} gradients={} deleted={} elapsed_ms={}",
                    self.config.name,
                    s.replaced,
                    s.unchanged,
                    s.missing,
                    s.generated,
                    s.deleted,
                    t0.elapsed().as_millis()
                );
                Ok(SyncRun::Completed(outcome))
            }
            Err(e) if e.is_non_fatal() => {
                warn!("figma update {} aborted: {}", self.config.name, e);
                match e {
                    SyncError::NotFound(what) => Ok(SyncRun::NotFound(what)),
                    _ => Ok(SyncRun::Cancelled),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn enter(&self, phase: SyncPhase) {
        let (step, total) = phase.step();
        info!("[{}/{}] {:?}", step, total, phase);
        self.stats.set_phase(phase);
    }

    async fn run_inner(&self) -> SyncResult<SyncOutcome> {
        let config = &self.config;
        let images_dir = config.images_dir();
        std::fs::create_dir_all(&images_dir).map_err(|e| SyncError::io(&images_dir, e))?;

        let remaps = Arc::new(RemapCache::load(config.remaps_path())?);
        let storage: Arc<dyn AssetStorage> = Arc::new(DirectoryStorage::new(
            config.folder.clone(),
            config.font_dirs.clone(),
            remaps.clone(),
        ));
        let client = FigmaClient::new(self.source.clone(), &config.document_key, config.id_batch_size);

        self.enter(SyncPhase::FetchingManifest);
        let (mut document, origin) = fetch_manifest(
            &client,
            &config.snapshot_path,
            &config.properties_to_cut,
            &self.token,
        )
        .await?;
        debug!("manifest origin {:?}", origin);

        self.enter(SyncPhase::ResolvingComponents);
        let missing = discover_missing(&document);
        resolve_missing(&mut document, &missing, &client, &self.token).await?;

        let plan = Planner::new(storage.as_ref()).plan(&document)?;

        let mut imports = ImportBatch::default();
        let mut downloads = Vec::new();
        let mut deleted = Vec::new();
        if config.download_images {
            self.enter(SyncPhase::DownloadingAssets);
            let retention = Arc::new(RetentionSet::new());
            let synced = self
                .sync_assets(&client, &plan, storage.clone(), remaps.clone(), retention.clone())
                .await;
            // Whatever the downloads achieved is safe to keep.
            let persisted = remaps.persist();
            (imports, downloads) = synced?;
            persisted?;

            self.enter(SyncPhase::CollectingGarbage);
            let complete = retention.complete(&self.token)?;
            let collector = GarbageCollector::new(
                storage.images_dir(),
                MANAGED_EXTENSIONS,
                config.sidecar_extension.clone(),
            );
            let report = collector.sweep(&complete, &remaps)?;
            self.stats.record_deleted(report.deleted.len() as u64);
            if !report.failed.is_empty() {
                warn!("{} dangling files could not be removed", report.failed.len());
            }
            if !report.pruned.is_empty() {
                debug!("pruned remap entries {:?}", report.pruned);
            }
            deleted = report.deleted;
        }

        discard_snapshot(&config.snapshot_path)?;
        self.enter(SyncPhase::Done);

        Ok(SyncOutcome {
            assets: plan.local_paths(),
            document,
            imports,
            downloads,
            deleted,
            stats: self.stats.snapshot(),
        })
    }

    /// Download image fills, raster and vector exports, and write gradients,
    /// all concurrently. Each remote kind is bounded by its own worker pool.
    async fn sync_assets(
        &self,
        client: &FigmaClient,
        plan: &AssetPlan,
        storage: Arc<dyn AssetStorage>,
        remaps: Arc<RemapCache>,
        retention: Arc<RetentionSet>,
    ) -> SyncResult<(ImportBatch, Vec<DownloadRecord>)> {
        let filter = self.config.download;
        let batch = Arc::new(Mutex::new(ImportBatch::default()));
        let downloader = Downloader::new(
            self.source.clone(),
            storage,
            remaps,
            retention.clone(),
            self.stats.clone(),
            self.config.max_concurrent_requests,
            self.token.clone(),
        );

        let png_hook: ImportHook = {
            let batch = batch.clone();
            Arc::new(move |_id: &str, resolved: &ResolvedPath| {
                batch.lock().png.push(resolved.absolute.clone())
            })
        };
        let svg_hook: ImportHook = {
            let batch = batch.clone();
            let sizes: BTreeMap<String, (Option<u32>, Option<u32>)> = plan
                .vector
                .iter()
                .map(|r| (r.id.clone(), (r.expected_width, r.expected_height)))
                .collect();
            Arc::new(move |id: &str, resolved: &ResolvedPath| {
                let (width, height) = sizes.get(id).copied().unwrap_or((None, None));
                batch.lock().svg.push(SvgImport {
                    path: resolved.absolute.clone(),
                    width,
                    height,
                });
            })
        };

        let fills = async {
            if !filter.image_fills || plan.image_fills.is_empty() {
                return Ok::<_, SyncError>(Vec::new());
            }
            info!("downloading {} image fills", plan.image_fills.len());
            let urls = cancellable(&self.token, client.image_fill_urls()).await?;
            let items = plan
                .image_fills
                .iter()
                .map(|r| (r.id.clone(), urls.get(&r.id).cloned()))
                .collect();
            downloader.download_all(items, "png", png_hook.clone()).await
        };

        let raster = async {
            if !filter.raster || plan.raster.is_empty() {
                return Ok::<_, SyncError>(Vec::new());
            }
            info!("downloading {} png renders", plan.raster.len());
            let items = self.render_items(client, &plan.raster, RenderFormat::Png).await?;
            downloader.download_all(items, "png", png_hook.clone()).await
        };

        let vector = async {
            if !filter.vector || plan.vector.is_empty() {
                return Ok::<_, SyncError>(Vec::new());
            }
            info!("downloading {} svg renders", plan.vector.len());
            let items = self.render_items(client, &plan.vector, RenderFormat::Svg).await?;
            downloader.download_all(items, "svg", svg_hook.clone()).await
        };

        let gradients = async { self.write_gradients(plan, &retention, &batch).await };

        let (fills, raster, vector, gradients) = tokio::join!(fills, raster, vector, gradients);
        if self.token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        gradients?;
        let mut downloads = fills?;
        downloads.extend(raster?);
        downloads.extend(vector?);
        downloads.sort_by(|a, b| a.id.cmp(&b.id));

        let mut imports = std::mem::take(&mut *batch.lock());
        imports.sort();
        Ok((imports, downloads))
    }

    async fn render_items(
        &self,
        client: &FigmaClient,
        requirements: &[AssetRequirement],
        format: RenderFormat,
    ) -> SyncResult<Vec<(String, Option<String>)>> {
        let ids: Vec<String> = requirements.iter().map(|r| r.id.clone()).collect();
        let mut urls = cancellable(&self.token, client.render_urls(&ids, format)).await?;
        Ok(ids
            .into_iter()
            .map(|id| {
                let url = urls.remove(&id).flatten();
                (id, url)
            })
            .collect())
    }

    /// Render every planned gradient. A failed write is logged and counted as
    /// missing; its path stays retained and the remaining gradients continue.
    async fn write_gradients(
        &self,
        plan: &AssetPlan,
        retention: &RetentionSet,
        batch: &Mutex<ImportBatch>,
    ) -> SyncResult<()> {
        if plan.gradients.is_empty() {
            return Ok(());
        }
        info!("writing {} gradients", plan.gradients.len());

        for (requirement, spec) in &plan.gradients {
            if self.token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let path = requirement.absolute_path.clone();
            retention.mark(&path);

            let spec = spec.clone();
            let target = path.clone();
            let written = match tokio::task::spawn_blocking(move || write_gradient(&spec, &target)).await {
                Ok(Ok(written)) => written,
                Ok(Err(e)) => {
                    warn!("gradient {} not written: {}", requirement.id, e);
                    self.stats.record_missing();
                    continue;
                }
                Err(e) => {
                    warn!("gradient task for {} failed: {}", requirement.id, e);
                    self.stats.record_missing();
                    continue;
                }
            };
            if written > 0 {
                self.stats.record_generated(written);
                batch.lock().gradients.push(path);
            }
        }
        Ok(())
    }
}
