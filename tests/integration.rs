//! End-to-end scenarios against the full router (spec.md §8), wired with a
//! fake [`PeerHttpClient`] so no real sockets are touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use overlay_coordinator::api;
use overlay_coordinator::config::Config;
use overlay_coordinator::db::Catalog;
use overlay_coordinator::error::{AppError, AppResult};
use overlay_coordinator::httpclient::{ByteStream, PeerHttpClient, RemoteDownload, RemoteFileEntry, RemoteHealth};
use overlay_coordinator::indexer::FileIndexer;
use overlay_coordinator::proxy::DownloadProxy;
use overlay_coordinator::registry::PeerRegistry;
use overlay_coordinator::state::AppState;
use overlay_coordinator::transfer::TransferManager;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tower::ServiceExt;

struct FakeHttp {
    healthy: AtomicBool,
    files: TokioMutex<Vec<RemoteFileEntry>>,
    download_body: &'static [u8],
}

impl FakeHttp {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            files: TokioMutex::new(vec![]),
            download_body: b"integration-test-bytes",
        }
    }
}

#[async_trait]
impl PeerHttpClient for FakeHttp {
    async fn health(&self, _base_url: &str, _timeout: Duration) -> AppResult<RemoteHealth> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(RemoteHealth { peer_id: "peer1".into(), files_count: 0 })
        } else {
            Err(AppError::TransportFailure("connection refused".into()))
        }
    }

    async fn list_files(&self, _base_url: &str, _timeout: Duration) -> AppResult<Vec<RemoteFileEntry>> {
        Ok(self.files.lock().await.clone())
    }

    async fn upload(
        &self,
        _base_url: &str,
        _filename: &str,
        _file_hash: &str,
        _bytes: Bytes,
        _timeout: Duration,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn download(&self, _base_url: &str, _file_hash: &str, _timeout: Duration) -> AppResult<RemoteDownload> {
        let body = self.download_body;
        let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(Bytes::from_static(body)) }));
        Ok(RemoteDownload { status: 200, content_length: Some(body.len() as u64), body: stream })
    }
}

async fn build_app() -> (axum::Router, Arc<FakeHttp>, Catalog) {
    let catalog = Catalog::connect_in_memory().await.unwrap();
    let fake = Arc::new(FakeHttp::new());
    let http: Arc<dyn PeerHttpClient> = fake.clone();
    let config = Config::from_env();

    let (reindex_tx, reindex_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(PeerRegistry::new(catalog.clone(), http.clone(), config.clone(), reindex_tx));
    let indexer = Arc::new(FileIndexer::new(catalog.clone(), http.clone(), config.clone()));
    let transfers = Arc::new(TransferManager::new(
        catalog.clone(),
        registry.clone(),
        indexer.clone(),
        http.clone(),
        config.clone(),
    ));
    let proxy = Arc::new(DownloadProxy::new(catalog.clone(), registry.clone(), http, config.clone()));
    tokio::spawn(indexer.clone().run_reindex_loop(reindex_rx));

    let state = AppState {
        catalog: catalog.clone(),
        registry,
        indexer,
        transfers,
        proxy,
        config,
    };
    (api::router(state), fake, catalog)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn register_then_index_then_search_finds_the_file() {
    let (app, fake, _catalog) = build_app().await;

    let register = app
        .clone()
        .oneshot(post(
            "/api/peers/register",
            json!({ "peer_id": "peer1", "host": "localhost", "port": 9001, "grpc_port": null }),
        ))
        .await
        .unwrap();
    assert_eq!(register.status(), StatusCode::OK);

    fake.files.lock().await.push(RemoteFileEntry {
        filename: "movie.mkv".to_string(),
        hash: "a".repeat(64),
        size: 1024,
        is_available: true,
        last_modified: chrono::Utc::now(),
    });

    let index = app
        .clone()
        .oneshot(post("/api/files/index/peer1", Value::Null))
        .await
        .unwrap();
    assert_eq!(index.status(), StatusCode::OK);

    let search = app
        .clone()
        .oneshot(post(
            "/api/files/search",
            json!({ "filename": null, "file_hash": "a".repeat(64), "min_size": null, "max_size": null, "peer_id": null }),
        ))
        .await
        .unwrap();
    assert_eq!(search.status(), StatusCode::OK);
    let body = json_body(search).await;
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
    assert_eq!(body["files"][0]["filename"], "movie.mkv");
}

#[tokio::test]
async fn upload_preserves_upload_provenance_and_is_not_overwritten_by_reindex() {
    let (app, fake, catalog) = build_app().await;
    app.clone()
        .oneshot(post(
            "/api/peers/register",
            json!({ "peer_id": "peer1", "host": "localhost", "port": 9001, "grpc_port": null }),
        ))
        .await
        .unwrap();

    let payload = b"hello overlay network";
    let hash = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hex::encode(hasher.finalize())
    };

    let boundary = "X-TEST-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n");
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"target_peer\"\r\n\r\n");
    body.extend_from_slice(b"peer1\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file_hash\"\r\n\r\n");
    body.extend_from_slice(hash.as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/transfers/upload-file")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resp_body = json_body(response).await;
    assert_eq!(resp_body["status"], "completed");

    let file = catalog.get_file_by_hash_and_peer(&hash, "peer1").await.unwrap().unwrap();
    assert_eq!(file.source(), overlay_coordinator::db::models::FileSource::Upload);

    // A subsequent reindex reporting an empty remote listing must not
    // erase the upload-provenance row's availability flag semantics
    // (it still marks unavailable since it's no longer observed, per
    // spec.md §4.3 step 4 -- provenance only protects field overwrites).
    let reindex = app
        .clone()
        .oneshot(post("/api/files/index/peer1", Value::Null))
        .await
        .unwrap();
    assert_eq!(reindex.status(), StatusCode::OK);
    let file_after = catalog.get_file_by_hash_and_peer(&hash, "peer1").await.unwrap().unwrap();
    assert_eq!(file_after.source(), overlay_coordinator::db::models::FileSource::Upload);
}

#[tokio::test]
async fn download_proxy_streams_bytes_for_an_indexed_file() {
    let (app, fake, _catalog) = build_app().await;
    app.clone()
        .oneshot(post(
            "/api/peers/register",
            json!({ "peer_id": "peer1", "host": "localhost", "port": 9001, "grpc_port": null }),
        ))
        .await
        .unwrap();
    let hash = "c".repeat(64);
    fake.files.lock().await.push(RemoteFileEntry {
        filename: "song.mp3".to_string(),
        hash: hash.clone(),
        size: 23,
        is_available: true,
        last_modified: chrono::Utc::now(),
    });
    app.clone().oneshot(post("/api/files/index/peer1", Value::Null)).await.unwrap();

    let response = app.clone().oneshot(get(&format!("/api/download/{hash}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"integration-test-bytes");
}

#[tokio::test]
async fn download_of_offline_source_yields_503() {
    let (app, fake, _catalog) = build_app().await;
    app.clone()
        .oneshot(post(
            "/api/peers/register",
            json!({ "peer_id": "peer1", "host": "localhost", "port": 9001, "grpc_port": null }),
        ))
        .await
        .unwrap();
    let hash = "d".repeat(64);
    fake.files.lock().await.push(RemoteFileEntry {
        filename: "doc.pdf".to_string(),
        hash: hash.clone(),
        size: 10,
        is_available: true,
        last_modified: chrono::Utc::now(),
    });
    app.clone().oneshot(post("/api/files/index/peer1", Value::Null)).await.unwrap();

    app.clone()
        .oneshot(Request::builder().method("DELETE").uri("/api/peers/peer1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let response = app.clone().oneshot(get(&format!("/api/download/{hash}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn search_for_unknown_peer_file_is_not_found_on_direct_download() {
    let (app, _fake, _catalog) = build_app().await;
    let response = app.clone().oneshot(get(&format!("/api/download/{}", "e".repeat(64)))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_peer_id_on_register_is_bad_request() {
    let (app, _fake, _catalog) = build_app().await;
    let response = app
        .clone()
        .oneshot(post(
            "/api/peers/register",
            json!({ "peer_id": "!!", "host": "localhost", "port": 9001, "grpc_port": null }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exceeding_the_rate_limit_returns_429() {
    let (app, _fake, _catalog) = build_app().await;
    let mut last_status = StatusCode::OK;
    for _ in 0..50 {
        let response = app.clone().oneshot(get("/api/health")).await.unwrap();
        last_status = response.status();
        if last_status == StatusCode::TOO_MANY_REQUESTS {
            break;
        }
    }
    assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
}
