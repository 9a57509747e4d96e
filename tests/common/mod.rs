#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use figma_sync_engine::config::SyncConfig;

pub const KEY: &str = "DOCKEY";
pub const TOKEN: &str = "secret-token";

/// In-memory stand-in for the document API and its asset CDN.
#[derive(Default)]
pub struct MockFigma {
    pub base: String,
    pub file: Mutex<Value>,
    pub document_missing: AtomicBool,
    /// Component bodies served by `/files/{key}/nodes`.
    pub components: Mutex<HashMap<String, Value>>,
    /// Image reference to asset name.
    pub image_fills: Mutex<HashMap<String, String>>,
    /// Node id to asset name; `None` renders as a null URL.
    pub renders: Mutex<HashMap<String, Option<String>>>,
    /// Asset name to (body, etag).
    pub assets: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub asset_delay_ms: AtomicU64,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub asset_hits: AtomicUsize,
    pub full_bodies: AtomicUsize,
    pub not_modified: AtomicUsize,
    pub file_requests: AtomicUsize,
    pub nodes_requests: AtomicUsize,
    pub unauthorized: AtomicUsize,
    /// Id count of every `/files/{key}/nodes` request.
    pub nodes_calls: Mutex<Vec<usize>>,
    /// Id count of every `/images/{key}` request.
    pub render_calls: Mutex<Vec<usize>>,
}

impl MockFigma {
    pub fn api_base(&self) -> String {
        format!("{}/v1", self.base)
    }

    pub fn asset_url(&self, name: &str) -> String {
        format!("{}/assets/{}", self.base, name)
    }

    pub fn set_file(&self, file: Value) {
        *self.file.lock() = file;
    }

    pub fn put_asset(&self, name: &str, body: &[u8], etag: &str) {
        self.assets
            .lock()
            .insert(name.to_string(), (body.to_vec(), etag.to_string()));
    }

    pub fn put_render(&self, id: &str, asset: Option<&str>) {
        self.renders
            .lock()
            .insert(id.to_string(), asset.map(str::to_string));
    }

    pub fn put_fill(&self, image_ref: &str, asset: &str) {
        self.image_fills
            .lock()
            .insert(image_ref.to_string(), asset.to_string());
    }

    pub fn put_component(&self, id: &str, document: Value) {
        self.components.lock().insert(id.to_string(), document);
    }

    pub fn config(&self, folder: &Path) -> SyncConfig {
        SyncConfig {
            api_base: self.api_base(),
            token: TOKEN.to_string(),
            document_key: KEY.to_string(),
            name: "Main".to_string(),
            folder: folder.to_path_buf(),
            snapshot_path: folder.join("Temp").join("FigmaUI.json"),
            request_timeout_secs: 10,
            ..SyncConfig::default()
        }
    }
}

type Shared = Arc<MockFigma>;

fn authorized(state: &MockFigma, headers: &HeaderMap) -> bool {
    let ok = headers
        .get("X-FIGMA-TOKEN")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == TOKEN);
    if !ok {
        state.unauthorized.fetch_add(1, Ordering::SeqCst);
    }
    ok
}

async fn file(State(state): State<Shared>, UrlPath(key): UrlPath<String>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    state.file_requests.fetch_add(1, Ordering::SeqCst);
    if key != KEY || state.document_missing.load(Ordering::SeqCst) {
        return (StatusCode::NOT_FOUND, "{\"status\":404,\"err\":\"Not found\"}").into_response();
    }
    let body = state.file.lock().to_string();
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn nodes(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    state.nodes_requests.fetch_add(1, Ordering::SeqCst);
    let ids: Vec<&str> = query.get("ids").map(String::as_str).unwrap_or("").split(',').collect();
    state.nodes_calls.lock().push(ids.len());
    let components = state.components.lock();
    let mut found = serde_json::Map::new();
    for id in ids {
        let entry = components
            .get(id)
            .map(|doc| json!({ "document": doc, "components": {}, "styles": {} }))
            .unwrap_or(Value::Null);
        found.insert(id.to_string(), entry);
    }
    axum::Json(json!({ "name": "mock", "nodes": found })).into_response()
}

async fn image_fills(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let images: HashMap<String, String> = state
        .image_fills
        .lock()
        .iter()
        .map(|(image_ref, asset)| (image_ref.clone(), state.asset_url(asset)))
        .collect();
    axum::Json(json!({ "error": false, "status": 200, "meta": { "images": images } })).into_response()
}

async fn renders(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let ids: Vec<&str> = query.get("ids").map(String::as_str).unwrap_or("").split(',').collect();
    state.render_calls.lock().push(ids.len());
    let renders = state.renders.lock();
    let mut images = serde_json::Map::new();
    for id in ids {
        let url = match renders.get(id) {
            Some(Some(asset)) => Value::String(state.asset_url(asset)),
            _ => Value::Null,
        };
        images.insert(id.to_string(), url);
    }
    axum::Json(json!({ "err": null, "images": images })).into_response()
}

struct InFlight<'a>(&'a MockFigma);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockFigma) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn asset(State(state): State<Shared>, UrlPath(name): UrlPath<String>, headers: HeaderMap) -> Response {
    state.asset_hits.fetch_add(1, Ordering::SeqCst);
    let _guard = InFlight::enter(&state);
    let delay = state.asset_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let Some((body, etag)) = state.assets.lock().get(&name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let quoted = format!("\"{}\"", etag);
    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == quoted);
    if matches {
        state.not_modified.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, quoted)]).into_response();
    }
    state.full_bodies.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, [(header::ETAG, quoted)], body).into_response()
}

pub async fn start_mock() -> (Arc<MockFigma>, SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(MockFigma {
        base: format!("http://{}", addr),
        file: Mutex::new(json!({ "name": "mock", "document": { "id": "0:0", "type": "DOCUMENT" } })),
        ..MockFigma::default()
    });

    let app = Router::new()
        .route("/v1/files/{key}", get(file))
        .route("/v1/files/{key}/nodes", get(nodes))
        .route("/v1/files/{key}/images", get(image_fills))
        .route("/v1/images/{key}", get(renders))
        .route("/assets/{name}", get(asset))
        .with_state(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, addr, handle)
}

/// A canvas holding the given nodes under the document root.
pub fn file_with(children: Value) -> Value {
    json!({
        "name": "mock",
        "document": {
            "id": "0:0",
            "type": "DOCUMENT",
            "children": [{ "id": "0:1", "type": "CANVAS", "children": children }]
        },
        "styles": {}
    })
}
