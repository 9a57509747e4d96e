mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use figma_sync_engine::error::SyncError;
use figma_sync_engine::source::http_source::HttpSource;
use figma_sync_engine::source::traits::{ConditionalFetch, DesignSource};

use common::{start_mock, KEY, TOKEN};

#[tokio::test]
async fn test_get_api_sends_token() {
    let (mock, _addr, _handle) = start_mock().await;
    let source = HttpSource::new(mock.api_base(), TOKEN, Duration::from_secs(5)).unwrap();

    let body = source.get_api(&format!("/files/{}", KEY)).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["document"]["type"], "DOCUMENT");
    assert_eq!(mock.unauthorized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_get_api_not_found_is_typed() {
    let (mock, _addr, _handle) = start_mock().await;
    let source = HttpSource::new(mock.api_base(), TOKEN, Duration::from_secs(5)).unwrap();

    let err = source.get_api("/files/UNKNOWN").await.unwrap_err();
    assert!(matches!(SyncError::classify(err), SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_get_api_wrong_token_is_transient() {
    let (mock, _addr, _handle) = start_mock().await;
    let source = HttpSource::new(mock.api_base(), "wrong", Duration::from_secs(5)).unwrap();

    let err = source.get_api(&format!("/files/{}", KEY)).await.unwrap_err();
    assert!(matches!(SyncError::classify(err), SyncError::TransientNetwork(_)));
    assert_eq!(mock.unauthorized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_conditional_round() {
    let (mock, _addr, _handle) = start_mock().await;
    mock.put_asset("a", b"payload", "v1");
    let source = HttpSource::new(mock.api_base(), TOKEN, Duration::from_secs(5)).unwrap();
    let url = mock.asset_url("a");

    let fresh = source.fetch_conditional(&url, None).await.unwrap();
    assert_eq!(
        fresh,
        ConditionalFetch::Fresh {
            bytes: bytes::Bytes::from_static(b"payload"),
            etag: Some("v1".to_string()),
        }
    );

    let again = source.fetch_conditional(&url, Some("v1")).await.unwrap();
    assert_eq!(again, ConditionalFetch::NotModified);

    // A stale validator gets the new body.
    mock.put_asset("a", b"payload-2", "v2");
    match source.fetch_conditional(&url, Some("v1")).await.unwrap() {
        ConditionalFetch::Fresh { bytes, etag } => {
            assert_eq!(&bytes[..], b"payload-2");
            assert_eq!(etag.as_deref(), Some("v2"));
        }
        other => panic!("expected fresh payload, got {other:?}"),
    }

    assert_eq!(mock.full_bodies.load(Ordering::SeqCst), 2);
    assert_eq!(mock.not_modified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_conditional_missing_asset() {
    let (mock, _addr, _handle) = start_mock().await;
    let source = HttpSource::new(mock.api_base(), TOKEN, Duration::from_secs(5)).unwrap();

    let err = source
        .fetch_conditional(&mock.asset_url("nope"), None)
        .await
        .unwrap_err();
    assert!(matches!(SyncError::classify(err), SyncError::NotFound(_)));
}
