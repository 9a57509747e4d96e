use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::traits::{ConditionalFetch, DesignSource};
use crate::config::TOKEN_HEADER;
use crate::error::SyncError;

pub struct HttpSource {
    client: Client,
    api_base: String,
    token: String,
}

impl HttpSource {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn build_api_request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        self.client.get(url).header(TOKEN_HEADER, self.token.as_str())
    }

    /// Only API-hosted URLs receive the token; asset URLs usually point at a CDN.
    fn build_asset_request(&self, url: &str) -> RequestBuilder {
        let req = self.client.get(url);
        if url.starts_with(&self.api_base) {
            req.header(TOKEN_HEADER, self.token.as_str())
        } else {
            req
        }
    }
}

/// Strip the weak prefix and the surrounding quotes from an ETag value.
pub fn normalize_etag(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_string()
}

fn status_error(status: StatusCode, target: &str) -> anyhow::Error {
    if status == StatusCode::NOT_FOUND {
        anyhow::Error::new(SyncError::NotFound(target.to_string()))
    } else {
        anyhow::Error::new(SyncError::TransientNetwork(format!(
            "HTTP {} for {}",
            status.as_u16(),
            target
        )))
    }
}

#[async_trait]
impl DesignSource for HttpSource {
    async fn get_api(&self, path: &str) -> Result<Bytes> {
        let resp = self.build_api_request(path).send().await?;

        let status = resp.status();
        debug!("api GET {} status={}", path, status.as_u16());
        if !status.is_success() {
            warn!("api GET {} failed status={}", path, status.as_u16());
            return Err(status_error(status, path));
        }

        Ok(resp.bytes().await?)
    }

    async fn fetch_conditional(&self, url: &str, etag: Option<&str>) -> Result<ConditionalFetch> {
        let mut req = self.build_asset_request(url);
        if let Some(tag) = etag {
            req = req.header(IF_NONE_MATCH, format!("\"{}\"", tag));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(ConditionalFetch::NotModified);
        }
        if !status.is_success() {
            warn!("asset fetch failed status={} url={}", status.as_u16(), url);
            return Err(status_error(status, url));
        }

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(normalize_etag)
            .filter(|v| !v.is_empty());

        // Buffer the whole body before anyone writes it to disk.
        let bytes = resp.bytes().await?;
        Ok(ConditionalFetch::Fresh { bytes, etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_etag() {
        assert_eq!(normalize_etag("\"abc\""), "abc");
        assert_eq!(normalize_etag("W/\"abc\""), "abc");
        assert_eq!(normalize_etag(" abc "), "abc");
    }
}
