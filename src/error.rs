// Error taxonomy for a synchronization run.

use std::path::PathBuf;

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Network failure; re-running the sync may succeed.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Remote document or node does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("synchronization cancelled")]
    Cancelled,

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("unsupported asset kind: {0}")]
    UnsupportedAssetKind(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Recover a typed error from an `anyhow` chain, classifying anything
    /// else as a transient network failure.
    pub fn classify(err: anyhow::Error) -> Self {
        match err.downcast::<SyncError>() {
            Ok(typed) => typed,
            Err(other) => match other.downcast::<reqwest::Error>() {
                Ok(e) => Self::TransientNetwork(e.to_string()),
                Err(other) => Self::TransientNetwork(format!("{:#}", other)),
            },
        }
    }

    /// Errors that end the run without being surfaced to the caller.
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Cancelled)
    }
}
