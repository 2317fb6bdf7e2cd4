use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::registry::now_iso;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    online_peers: i64,
    timestamp: String,
}

/// `GET /api/health`: a liveness probe for the coordinator itself, distinct
/// from the per-peer health probes `PeerRegistry` runs (spec.md §4.1). A
/// failed catalog query surfaces as `Internal` rather than a fabricated
/// "healthy" response — there is no value in lying about liveness.
pub async fn health(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.catalog.system_stats().await?;
    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        online_peers: stats.online_peers,
        timestamp: now_iso(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.catalog.system_stats().await?))
}
