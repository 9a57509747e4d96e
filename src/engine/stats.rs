// Run statistics: download outcomes, worker counts, and the coarse phase.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Coarse progress of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingManifest,
    ResolvingComponents,
    DownloadingAssets,
    CollectingGarbage,
    Done,
}

impl SyncPhase {
    /// (step, total) for progress reporting.
    pub fn step(self) -> (u32, u32) {
        let step = match self {
            Self::Idle => 0,
            Self::FetchingManifest => 1,
            Self::ResolvingComponents => 2,
            Self::DownloadingAssets => 3,
            Self::CollectingGarbage => 4,
            Self::Done => 5,
        };
        (step, 5)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub phase: SyncPhase,
    pub unchanged: u64,
    pub replaced: u64,
    pub missing: u64,
    pub generated: u64,
    pub deleted: u64,
    pub bytes_written: u64,
    pub active_workers: u32,
    pub peak_workers: u32,
}

pub struct SyncStats {
    unchanged: AtomicU64,
    replaced: AtomicU64,
    missing: AtomicU64,
    generated: AtomicU64,
    deleted: AtomicU64,
    bytes_written: AtomicU64,
    active_workers: AtomicU32,
    peak_workers: AtomicU32,
    phase: Mutex<SyncPhase>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self {
            unchanged: AtomicU64::new(0),
            replaced: AtomicU64::new(0),
            missing: AtomicU64::new(0),
            generated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            active_workers: AtomicU32::new(0),
            peak_workers: AtomicU32::new(0),
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock() = phase;
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replaced(&self, bytes: u64) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generated(&self, bytes: u64) {
        self.generated.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, count: u64) {
        self.deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_workers(&self) {
        let now = self.active_workers.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_workers.fetch_max(now, Ordering::Relaxed);
    }

    pub fn decrement_workers(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            phase: self.phase(),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            peak_workers: self.peak_workers.load(Ordering::Relaxed),
        }
    }
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}
