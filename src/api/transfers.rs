use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DownloadRequest {
    pub file_hash: String,
    pub requesting_peer_id: String,
}

pub async fn initiate_download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> AppResult<impl IntoResponse> {
    let resp = state
        .transfers
        .initiate_download(&req.file_hash, &req.requesting_peer_id)
        .await?;
    Ok(Json(resp))
}

/// Accepts multipart `file` and `target_peer` fields (spec.md §6). An
/// optional `file_hash` field, if present, is validated against the
/// SHA-256 of the uploaded bytes (spec.md §6 Validation). The payload
/// never touches disk at the coordinator: it lives only as the
/// `Bytes` buffer axum's multipart extractor already holds, which is
/// dropped exactly once on every exit path of this function — success,
/// validation failure, or transport failure alike. See DESIGN.md.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut filename: Option<String> = None;
    let mut target_peer: Option<String> = None;
    let mut declared_hash: Option<String> = None;
    let mut bytes: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::InvalidInput(format!("failed reading file field: {e}")))?,
                );
            }
            "target_peer" => {
                target_peer = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(format!("failed reading target_peer: {e}")))?,
                );
            }
            "file_hash" => {
                declared_hash = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(format!("failed reading file_hash: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| AppError::InvalidInput("missing file field".to_string()))?;
    let filename = filename.ok_or_else(|| AppError::InvalidInput("missing filename".to_string()))?;
    let target_peer =
        target_peer.ok_or_else(|| AppError::InvalidInput("missing target_peer field".to_string()))?;
    let declared_hash = declared_hash.unwrap_or_else(|| sha256_hex(&bytes));

    let resp = state
        .transfers
        .initiate_upload(&filename, &declared_hash, &target_peer, bytes)
        .await?;
    Ok(Json(resp))
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.transfers.get_status(id).await?))
}

pub async fn active(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.transfers.list_active().await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub peer_id: Option<String>,
    pub limit: Option<u32>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = q.limit.unwrap_or(50).clamp(1, 100);
    let history = state.transfers.history(q.peer_id.as_deref(), limit).await?;
    Ok(Json(history))
}

fn sha256_hex(bytes: &Bytes) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
