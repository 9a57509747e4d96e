// Typed wrappers over the document API endpoints the pipeline consumes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::traits::DesignSource;
use crate::error::SyncError;
use crate::manifest::document::{RawNode, Style};

/// One entry of `GET /files/{id}/nodes`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeBody {
    pub document: RawNode,
    #[serde(default)]
    pub styles: BTreeMap<String, Style>,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    #[serde(default)]
    nodes: HashMap<String, Option<NodeBody>>,
}

#[derive(Debug, Deserialize)]
struct ImageFillsResponse {
    meta: ImageFillsMeta,
}

#[derive(Debug, Deserialize)]
struct ImageFillsMeta {
    #[serde(default)]
    images: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

/// Export format requested from the render endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Png,
    Svg,
}

impl RenderFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

pub struct FigmaClient {
    source: Arc<dyn DesignSource>,
    key: String,
    batch_size: usize,
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        anyhow::Error::new(SyncError::MalformedManifest(format!("{}: {}", what, e)))
    })
}

impl FigmaClient {
    pub fn new(source: Arc<dyn DesignSource>, key: impl Into<String>, batch_size: usize) -> Self {
        Self {
            source,
            key: key.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw manifest body including vector geometry.
    pub async fn file_json(&self) -> Result<Bytes> {
        self.source
            .get_api(&format!("/files/{}?geometry=paths", self.key))
            .await
    }

    /// Fetch node bodies by id. Ids unknown to the server are absent from the result.
    pub async fn nodes(&self, ids: &[String]) -> Result<BTreeMap<String, NodeBody>> {
        let requests = ids.chunks(self.batch_size).map(|group| {
            let path = format!("/files/{}/nodes?ids={}", self.key, group.join(","));
            async move {
                let bytes = self.source.get_api(&path).await?;
                decode::<NodesResponse>(&bytes, "nodes response")
            }
        });

        let mut found = BTreeMap::new();
        for response in try_join_all(requests).await? {
            for (id, body) in response.nodes {
                if let Some(body) = body {
                    found.insert(id, body);
                }
            }
        }
        debug!("nodes lookup requested={} found={}", ids.len(), found.len());
        Ok(found)
    }

    /// Map of image reference to download URL for every image fill in the file.
    pub async fn image_fill_urls(&self) -> Result<HashMap<String, String>> {
        let bytes = self
            .source
            .get_api(&format!("/files/{}/images", self.key))
            .await?;
        Ok(decode::<ImageFillsResponse>(&bytes, "image fills response")?.meta.images)
    }

    /// Render the given nodes and return node id to URL. A `None` URL means
    /// the server could not render that node.
    pub async fn render_urls(
        &self,
        ids: &[String],
        format: RenderFormat,
    ) -> Result<BTreeMap<String, Option<String>>> {
        let requests = ids.chunks(self.batch_size).map(|group| {
            let path = format!(
                "/images/{}?ids={}&format={}",
                self.key,
                group.join(","),
                format.as_str()
            );
            async move {
                let bytes = self.source.get_api(&path).await?;
                decode::<RenderResponse>(&bytes, "render response")
            }
        });

        let mut urls = BTreeMap::new();
        for response in try_join_all(requests).await? {
            urls.extend(response.images);
        }
        Ok(urls)
    }
}
