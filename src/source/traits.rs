use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Result of a byte fetch carrying an optional `If-None-Match` precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalFetch {
    /// The cached validator still matches; no body was transferred.
    NotModified,
    /// A fresh payload, fully buffered, with its validator if the server sent one.
    Fresh { bytes: Bytes, etag: Option<String> },
}

#[async_trait]
pub trait DesignSource: Send + Sync {
    /// Authenticated GET against the document API. `path` starts with `/`.
    async fn get_api(&self, path: &str) -> Result<Bytes>;

    /// GET an asset URL returned by the API, conditional on `etag` when given.
    async fn fetch_conditional(&self, url: &str, etag: Option<&str>) -> Result<ConditionalFetch>;
}
