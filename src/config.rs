use std::path::PathBuf;

use serde::Deserialize;

use crate::error::SyncError;

/// Maximum number of byte fetches in flight per asset kind.
pub const MAX_CONCURRENT_REQUESTS: usize = 5;

/// Identifier group size for endpoints that take a comma-separated id list.
pub const ID_BATCH_SIZE: usize = 100;

/// Base URL of the remote document API.
pub const DEFAULT_API_BASE: &str = "https://api.figma.com/v1";

/// Header carrying the personal access token.
pub const TOKEN_HEADER: &str = "X-FIGMA-TOKEN";

/// Transient manifest snapshot. Its presence switches the fetcher to resume mode.
pub const DEFAULT_SNAPSHOT_PATH: &str = "Temp/FigmaUI.json";

/// Manifest substructures stripped before parsing.
pub const PROPERTIES_TO_CUT: &[&str] = &["componentProperties"];

/// Sub-directory (under the document folder) holding synced images.
pub const IMAGES_DIR: &str = "Images";

/// Sub-directory (under the document folder) holding local fonts.
pub const FONTS_DIR: &str = "Fonts";

/// Extensions the garbage collector is allowed to delete.
pub const MANAGED_EXTENSIONS: &[&str] = &["png", "svg"];

/// Default per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Which remote asset kinds are downloaded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownloadFilter {
    pub image_fills: bool,
    pub raster: bool,
    pub vector: bool,
}

impl Default for DownloadFilter {
    fn default() -> Self {
        Self {
            image_fills: true,
            raster: true,
            vector: true,
        }
    }
}

/// Top-level configuration for one synchronization run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the document API.
    pub api_base: String,
    /// Personal access token sent with every API call.
    pub token: String,
    /// Remote document key (the `{id}` in `/files/{id}`).
    pub document_key: String,
    /// Local document name; names the remap file.
    pub name: String,
    /// Folder that receives `Images/` and the remap file.
    pub folder: PathBuf,
    /// Transient manifest snapshot path.
    pub snapshot_path: PathBuf,
    pub max_concurrent_requests: usize,
    pub id_batch_size: usize,
    pub request_timeout_secs: u64,
    /// When false only the manifest is fetched and planned.
    pub download_images: bool,
    pub download: DownloadFilter,
    /// Extra directories searched for fonts.
    pub font_dirs: Vec<PathBuf>,
    /// Host sidecar file extension deleted next to each orphan.
    pub sidecar_extension: Option<String>,
    pub properties_to_cut: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: String::new(),
            document_key: String::new(),
            name: String::new(),
            folder: PathBuf::new(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            id_batch_size: ID_BATCH_SIZE,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            download_images: true,
            download: DownloadFilter::default(),
            font_dirs: Vec::new(),
            sidecar_extension: Some("meta".to_string()),
            properties_to_cut: PROPERTIES_TO_CUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    /// Path of the durable remap file for this document.
    pub fn remaps_path(&self) -> PathBuf {
        self.folder.join(format!("remaps_{}.json", self.name))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.folder.join(IMAGES_DIR)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let invalid = |reason: &str| SyncError::InvalidConfig(reason.to_string());
        if self.document_key.trim().is_empty() {
            return Err(invalid("document key is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("document name is empty"));
        }
        if self.token.trim().is_empty() {
            return Err(invalid("access token is empty"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests must be > 0"));
        }
        if self.id_batch_size == 0 {
            return Err(invalid("id_batch_size must be > 0"));
        }
        Ok(())
    }
}
