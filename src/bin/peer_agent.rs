//! Minimal reference Peer Node Agent (SPEC_FULL.md §D).
//!
//! `spec.md` §4.6 specifies only the coordinator's view of a peer's REST
//! surface; this binary exists so the coordinator has something real to
//! register with and proxy downloads through in integration tests. It owns
//! no transfer-manager or catalog logic of its own — just a directory scan,
//! SHA-256 hashing, and the five routes the coordinator consumes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "peer-agent")]
#[command(about = "Reference Peer Node Agent for the overlay coordinator", long_about = None)]
struct CliArgs {
    #[arg(long)]
    peer_id: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "9000")]
    port: u16,

    #[arg(long)]
    grpc_port: Option<u16>,

    #[arg(long, default_value = "http://127.0.0.1:8000")]
    coordinator_url: String,

    #[arg(long, default_value = "./shared")]
    shared_dir: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedFile {
    filename: String,
    hash: String,
    size: i64,
    is_available: bool,
    last_modified: DateTime<Utc>,
}

struct AgentState {
    shared_dir: PathBuf,
    files: RwLock<HashMap<String, SharedFile>>,
    peer_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::new(format!("peer_agent={}", args.log_level)))
        .try_init();

    std::fs::create_dir_all(&args.shared_dir)?;

    let state = Arc::new(AgentState {
        shared_dir: args.shared_dir.clone(),
        files: RwLock::new(HashMap::new()),
        peer_id: args.peer_id.clone(),
    });
    rescan(&state).await?;

    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/files", get(list_files))
        .route("/api/download/{hash}", get(download))
        .route("/api/upload", post(upload))
        .route("/api/peers", get(peers_passthrough))
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, peer_id = %args.peer_id, "peer agent listening");

    let registration = tokio::spawn(register_with_retry(
        args.coordinator_url.clone(),
        args.peer_id.clone(),
        args.host.clone(),
        args.port,
        args.grpc_port,
    ));

    let serve = axum::serve(listener, router.into_make_service());
    tokio::select! {
        result = serve => result.map_err(anyhow::Error::from)?,
        _ = registration => {},
    }
    Ok(())
}

/// Registration retry: 5 attempts, fixed 2s delay between failures
/// (grounded on `central_client.py`'s `register_with_central`).
async fn register_with_retry(
    coordinator_url: String,
    peer_id: String,
    host: String,
    port: u16,
    grpc_port: Option<u16>,
) {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "peer_id": peer_id,
        "host": host,
        "port": port,
        "grpc_port": grpc_port,
    });

    for attempt in 1..=MAX_RETRIES {
        let result = client
            .post(format!("{coordinator_url}/api/peers/register"))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(%peer_id, attempt, "registered with coordinator");
                return;
            }
            Ok(resp) => {
                warn!(%peer_id, attempt, status = %resp.status(), "registration rejected");
            }
            Err(err) => {
                warn!(%peer_id, attempt, %err, "registration request failed");
            }
        }

        if attempt < MAX_RETRIES {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    warn!(%peer_id, "failed to register with coordinator after all retries");
}

async fn rescan(state: &Arc<AgentState>) -> anyhow::Result<()> {
    let mut files = HashMap::new();
    for entry in std::fs::read_dir(&state.shared_dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        let hash = sha256_hex(&bytes);
        let metadata = entry.metadata()?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        files.insert(
            hash.clone(),
            SharedFile {
                filename,
                hash,
                size: bytes.len() as i64,
                is_available: true,
                last_modified,
            },
        );
    }
    *state.files.write().await = files;
    Ok(())
}

async fn health(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    let files_count = state.files.read().await.len();
    Json(serde_json::json!({
        "peer_id": state.peer_id,
        "files_count": files_count,
    }))
}

async fn list_files(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    let files: Vec<SharedFile> = state.files.read().await.values().cloned().collect();
    Json(serde_json::json!({ "files": files }))
}

async fn download(
    State(state): State<Arc<AgentState>>,
    AxumPath(hash): AxumPath<String>,
) -> impl IntoResponse {
    let files = state.files.read().await;
    let Some(entry) = files.get(&hash) else {
        return (axum::http::StatusCode::NOT_FOUND, "file not found").into_response();
    };
    let path = state.shared_dir.join(&entry.filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, "file missing on disk").into_response(),
    }
}

async fn upload(
    State(state): State<Arc<AgentState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut filename = None;
    let mut bytes = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            bytes = field.bytes().await.ok();
        }
    }
    let (Some(filename), Some(bytes)) = (filename, bytes) else {
        return (axum::http::StatusCode::BAD_REQUEST, "missing file field").into_response();
    };

    let path = state.shared_dir.join(&filename);
    if tokio::fs::write(&path, &bytes).await.is_err() {
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to persist upload")
            .into_response();
    }

    let hash = sha256_hex(&bytes);
    state.files.write().await.insert(
        hash.clone(),
        SharedFile {
            filename,
            hash,
            size: bytes.len() as i64,
            is_available: true,
            last_modified: Utc::now(),
        },
    );
    (axum::http::StatusCode::OK, "stored").into_response()
}

/// Reference agents don't track other peers themselves; this stays a
/// thin passthrough returning an empty list so the route exists for
/// parity with §6's endpoint table.
async fn peers_passthrough() -> impl IntoResponse {
    Json(serde_json::json!({ "peers": [] }))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
