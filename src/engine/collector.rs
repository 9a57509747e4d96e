// Mark-and-sweep over the images directory, scoped to one run.
//
// Marking happens while assets are downloaded or generated; `RetentionSet::complete`
// seals the marks, and only a sealed set can be swept.

use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::remap::RemapCache;
use crate::error::{SyncError, SyncResult};

/// Local paths confirmed as still required during the current run.
#[derive(Debug, Default)]
pub struct RetentionSet {
    paths: Mutex<BTreeSet<PathBuf>>,
}

impl RetentionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, path: &Path) {
        self.paths.lock().insert(path.to_path_buf());
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    /// Seal the marks for sweeping. Refused once the run was cancelled,
    /// since marking may have stopped part way.
    pub fn complete(&self, token: &CancellationToken) -> SyncResult<CompleteRetention> {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let paths = self.paths.lock();
        let file_names = paths
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect();
        let stems = paths
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        Ok(CompleteRetention { file_names, stems })
    }
}

/// A fully populated retention set, keyed by file name.
#[derive(Debug)]
pub struct CompleteRetention {
    file_names: HashSet<OsString>,
    stems: HashSet<String>,
}

impl CompleteRetention {
    pub fn retains(&self, file_name: &OsString) -> bool {
        self.file_names.contains(file_name)
    }

    /// True when some retained file, of any extension, uses `stem`.
    pub fn retains_stem(&self, stem: &str) -> bool {
        self.stems.contains(stem)
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    /// Orphans that could not be removed; they stay for the next run.
    pub failed: Vec<PathBuf>,
    pub pruned: Vec<String>,
}

pub struct GarbageCollector {
    images_dir: PathBuf,
    extensions: Vec<String>,
    sidecar_extension: Option<String>,
}

impl GarbageCollector {
    pub fn new(
        images_dir: impl Into<PathBuf>,
        extensions: &[&str],
        sidecar_extension: Option<String>,
    ) -> Self {
        Self {
            images_dir: images_dir.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            sidecar_extension,
        }
    }

    /// Managed files currently on disk, by file name.
    pub fn present_files(&self) -> SyncResult<BTreeSet<OsString>> {
        let entries = match std::fs::read_dir(&self.images_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(SyncError::io(&self.images_dir, e)),
        };

        let mut present = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let managed = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| self.extensions.iter().any(|m| m == e));
            if managed {
                present.insert(entry.file_name());
            }
        }
        Ok(present)
    }

    /// Delete every managed file not retained, with its sidecar, prune the
    /// remap entries whose stem no longer has a file, and persist the remap
    /// table even when nothing was deleted.
    pub fn sweep(&self, retention: &CompleteRetention, remaps: &RemapCache) -> SyncResult<SweepReport> {
        let present = match self.present_files() {
            Ok(present) => present,
            Err(e) => {
                remaps.persist()?;
                return Err(e);
            }
        };
        self.sweep_present(present, retention, remaps)
    }

    fn sweep_present(
        &self,
        present: BTreeSet<OsString>,
        retention: &CompleteRetention,
        remaps: &RemapCache,
    ) -> SyncResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut surviving = HashSet::new();
        for name in present {
            if retention.retains(&name) {
                insert_stem(&mut surviving, &name);
                continue;
            }

            let path = self.images_dir.join(&name);
            info!("removing dangling file {}", path.display());
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("failed to remove {}: {}", path.display(), e);
                insert_stem(&mut surviving, &name);
                report.failed.push(path);
                continue;
            }

            if let Some(sidecar_ext) = &self.sidecar_extension {
                let mut sidecar = name.clone();
                sidecar.push(".");
                sidecar.push(sidecar_ext);
                let sidecar = self.images_dir.join(sidecar);
                match std::fs::remove_file(&sidecar) {
                    Ok(()) => debug!("removed sidecar {}", sidecar.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("failed to remove sidecar {}: {}", sidecar.display(), e),
                }
            }
            report.deleted.push(path);
        }

        // An entry keeps its place while a file with its stem is on disk or
        // still required by this run (a failed download keeps the old entry).
        let stale: HashSet<String> = remaps
            .entries()
            .into_values()
            .map(|entry| entry.stem)
            .filter(|stem| !surviving.contains(stem) && !retention.retains_stem(stem))
            .collect();
        report.pruned = remaps.prune_stems(&stale);
        remaps.persist()?;
        Ok(report)
    }
}

fn insert_stem(stems: &mut HashSet<String>, file_name: &OsString) {
    if let Some(stem) = Path::new(file_name).file_stem().and_then(|s| s.to_str()) {
        stems.insert(stem.to_string());
    }
}
