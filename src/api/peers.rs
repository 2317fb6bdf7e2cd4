use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegisterRequest {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
    pub grpc_port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state
        .registry
        .register(&req.peer_id, &req.host, req.port, req.grpc_port)
        .await?;
    let message = if created {
        format!("peer {} registered", req.peer_id)
    } else {
        format!("peer {} re-registered", req.peer_id)
    };
    Ok((StatusCode::OK, Json(SimpleResponse { success: true, message })))
}

pub async fn unregister(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.registry.unregister(&peer_id).await?;
    Ok((
        StatusCode::OK,
        Json(SimpleResponse {
            success: true,
            message: format!("peer {peer_id} deregistered"),
        }),
    ))
}

pub async fn list_all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.registry.list_all().await?))
}

pub async fn list_online(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.registry.list_online().await?))
}

pub async fn status(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.registry.status(&peer_id).await?))
}
