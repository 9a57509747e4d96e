// Durable remap table: node id to local file stem plus the last seen validator.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::write_atomic;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// On-disk entry; older files map ids straight to a stem.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Stem(String),
    Entry(RemapEntry),
}

impl From<StoredEntry> for RemapEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Stem(stem) => RemapEntry { stem, etag: None },
            StoredEntry::Entry(entry) => entry,
        }
    }
}

pub struct RemapCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, RemapEntry>>,
    write_lock: Mutex<()>,
}

impl RemapCache {
    /// An empty table that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Read the table from `path`, or start empty when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(e) => return Err(SyncError::io(&path, e)),
        };

        let stored: BTreeMap<String, StoredEntry> = serde_json::from_str(&text).map_err(|e| {
            SyncError::MalformedManifest(format!("remap file {}: {}", path.display(), e))
        })?;
        let entries: BTreeMap<String, RemapEntry> =
            stored.into_iter().map(|(k, v)| (k, v.into())).collect();
        debug!("loaded {} remap entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Local file stem for `id`; the id itself when no entry exists.
    pub fn stem_for(&self, id: &str) -> String {
        self.entries
            .read()
            .get(id)
            .map(|e| e.stem.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn version_tag(&self, id: &str) -> Option<String> {
        self.entries.read().get(id).and_then(|e| e.etag.clone())
    }

    pub fn get(&self, id: &str) -> Option<RemapEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Store the validator of a freshly written payload. Without a validator
    /// any stale one is dropped so the next run fetches unconditionally.
    pub fn record_version(&self, id: &str, etag: Option<String>) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            entry.etag = etag;
            return;
        }
        if let Some(etag) = etag {
            entries.insert(
                id.to_string(),
                RemapEntry {
                    stem: id.to_string(),
                    etag: Some(etag),
                },
            );
        }
    }

    /// Drop every entry whose stem is in `stems`; returns the removed ids.
    pub fn prune_stems(&self, stems: &HashSet<String>) -> Vec<String> {
        let mut entries = self.entries.write();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, e)| stems.contains(&e.stem))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            entries.remove(id);
        }
        doomed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn entries(&self) -> BTreeMap<String, RemapEntry> {
        self.entries.read().clone()
    }

    /// Atomically replace the durable file with the current table.
    pub fn persist(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        let json = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries)
                .map_err(|e| SyncError::io(&self.path, std::io::Error::other(e)))?
        };
        write_atomic(&self.path, json.as_bytes())?;
        debug!("persisted remap table to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RemapCache::load(dir.path().join("remaps_x.json")).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stem_for("1:2"), "1:2");
        assert_eq!(cache.version_tag("1:2"), None);
    }

    #[test]
    fn test_legacy_and_structured_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remaps_x.json");
        std::fs::write(
            &path,
            r#"{"a": "logo", "b": {"stem": "hero", "etag": "v1"}}"#,
        )
        .unwrap();

        let cache = RemapCache::load(&path).unwrap();
        assert_eq!(cache.stem_for("a"), "logo");
        assert_eq!(cache.version_tag("a"), None);
        assert_eq!(cache.stem_for("b"), "hero");
        assert_eq!(cache.version_tag("b").as_deref(), Some("v1"));
    }

    #[test]
    fn test_record_version_and_persist_roundtrip_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remaps_x.json");
        let cache = RemapCache::new(&path);
        cache.record_version("z", Some("e2".into()));
        cache.record_version("a", Some("e1".into()));
        cache.record_version("none", None);
        assert_eq!(cache.len(), 2);

        cache.persist().unwrap();
        let first = std::fs::read(&path).unwrap();
        let reloaded = RemapCache::load(&path).unwrap();
        assert_eq!(reloaded.entries(), cache.entries());
        reloaded.persist().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_record_without_validator_clears_stale_one() {
        let cache = RemapCache::new("unused.json");
        cache.record_version("a", Some("old".into()));
        cache.record_version("a", None);
        assert_eq!(cache.get("a").unwrap().etag, None);
        assert_eq!(cache.stem_for("a"), "a");
    }

    #[test]
    fn test_prune_stems() {
        let cache = RemapCache::new("unused.json");
        cache.record_version("a", Some("1".into()));
        cache.record_version("b", Some("2".into()));
        let removed = cache.prune_stems(&HashSet::from(["a".to_string()]));
        assert_eq!(removed, vec!["a".to_string()]);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remaps_x.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(RemapCache::load(&path).is_err());
    }
}
