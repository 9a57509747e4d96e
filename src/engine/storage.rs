// Asset storage: where an asset of a given name and extension lives on disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::remap::RemapCache;
use crate::config::{FONTS_DIR, IMAGES_DIR};
use crate::detect::image::sniff_dimensions;
use crate::error::{SyncError, SyncResult};

/// Location of an asset: `relative` is how markup refers to it, `absolute`
/// is where the bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub exists: bool,
    pub relative: String,
    pub absolute: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSize {
    pub exists: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub trait AssetStorage: Send + Sync {
    fn resolve_asset_path(&self, name: &str, extension: &str) -> SyncResult<ResolvedPath>;

    fn resolve_asset_size(&self, name: &str, extension: &str) -> SyncResult<ResolvedSize>;

    /// Directory holding synced images; the garbage collector sweeps it.
    fn images_dir(&self) -> PathBuf;
}

/// Storage rooted at a document folder: images under `Images/`, fonts under
/// `Fonts/` or one of the extra font directories.
pub struct DirectoryStorage {
    folder: PathBuf,
    font_dirs: Vec<PathBuf>,
    remaps: Arc<RemapCache>,
}

impl DirectoryStorage {
    pub fn new(folder: impl Into<PathBuf>, font_dirs: Vec<PathBuf>, remaps: Arc<RemapCache>) -> Self {
        Self {
            folder: folder.into(),
            font_dirs,
            remaps,
        }
    }

    fn font_path(&self, name: &str, extension: &str) -> Option<(String, PathBuf)> {
        let local = format!("{}/{}.{}", FONTS_DIR, name, extension);
        let absolute = self.folder.join(&local);
        if absolute.exists() {
            return Some((local, absolute));
        }
        self.font_dirs.iter().find_map(|dir| {
            let absolute = dir.join(format!("{}.{}", name, extension));
            absolute
                .exists()
                .then(|| (format!("/{}", absolute.to_string_lossy().replace('\\', "/")), absolute))
        })
    }
}

impl AssetStorage for DirectoryStorage {
    fn resolve_asset_path(&self, name: &str, extension: &str) -> SyncResult<ResolvedPath> {
        match extension {
            "png" | "svg" => {
                let relative = format!("{}/{}.{}", IMAGES_DIR, self.remaps.stem_for(name), extension);
                let absolute = self.folder.join(&relative);
                Ok(ResolvedPath {
                    exists: absolute.exists(),
                    relative,
                    absolute,
                })
            }
            "ttf" | "otf" => Ok(match self.font_path(name, extension) {
                Some((relative, absolute)) => ResolvedPath {
                    exists: true,
                    relative,
                    absolute,
                },
                None => ResolvedPath {
                    exists: false,
                    relative: String::new(),
                    absolute: PathBuf::new(),
                },
            }),
            "asset" => {
                let font = self.font_path(name, extension);
                let (rel_dir, abs_dir) = match &font {
                    Some((rel, abs)) => (
                        rel.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default(),
                        abs.parent().map(Path::to_path_buf).unwrap_or_default(),
                    ),
                    None => (String::new(), PathBuf::new()),
                };
                let file = format!("{} SDF.{}", name, extension);
                Ok(ResolvedPath {
                    exists: font.is_some(),
                    relative: format!("{}/{}", rel_dir, file),
                    absolute: abs_dir.join(file),
                })
            }
            other => Err(SyncError::UnsupportedAssetKind(format!(
                "cannot resolve '{}' with extension '{}'",
                name, other
            ))),
        }
    }

    fn resolve_asset_size(&self, name: &str, extension: &str) -> SyncResult<ResolvedSize> {
        if !matches!(extension, "png" | "svg") {
            return Err(SyncError::UnsupportedAssetKind(format!(
                "no size for extension '{}'",
                extension
            )));
        }
        let resolved = self.resolve_asset_path(name, extension)?;
        if !resolved.exists {
            return Ok(ResolvedSize {
                exists: false,
                width: None,
                height: None,
            });
        }
        let data = std::fs::read(&resolved.absolute).map_err(|e| SyncError::io(&resolved.absolute, e))?;
        let size = sniff_dimensions(&data);
        Ok(ResolvedSize {
            exists: true,
            width: size.map(|(w, _)| w),
            height: size.map(|(_, h)| h),
        })
    }

    fn images_dir(&self) -> PathBuf {
        self.folder.join(IMAGES_DIR)
    }
}

/// Write `bytes` to `path` all-or-nothing: a temp file in the same directory
/// is filled, flushed, and renamed over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> SyncResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| SyncError::io(dir, e))?;
    temp.write_all(bytes).map_err(|e| SyncError::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| SyncError::io(path, e))?;
    temp.persist(path).map_err(|e| SyncError::io(path, e.error))?;
    Ok(())
}
