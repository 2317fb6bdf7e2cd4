use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::peers::SimpleResponse;
use crate::db::SearchFilter;
use crate::error::AppResult;
use crate::state::AppState;
use crate::validation::clamp_pagination;

pub async fn index_peer(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.indexer.reindex_peer(&peer_id).await?;
    Ok((
        StatusCode::OK,
        Json(SimpleResponse {
            success: true,
            message: format!("peer {peer_id} reindexed"),
        }),
    ))
}

#[derive(Serialize)]
pub struct IndexAllResponse {
    pub success: bool,
    pub results: HashMap<String, bool>,
}

pub async fn index_all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let results = state.indexer.index_all().await?;
    Ok(Json(IndexAllResponse {
        success: true,
        results,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchRequest {
    pub filename: Option<String>,
    pub file_hash: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub peer_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchResponse {
    pub files: Vec<crate::db::models::FileRow>,
    pub search_time_ms: f64,
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> AppResult<impl IntoResponse> {
    let filter = SearchFilter {
        filename: req.filename,
        file_hash: req.file_hash,
        min_size: req.min_size,
        max_size: req.max_size,
        peer_id: req.peer_id,
    };
    let outcome = state.catalog.search(&filter).await?;
    Ok(Json(SearchResponse {
        files: outcome.files,
        search_time_ms: outcome.search_time.as_secs_f64() * 1000.0,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn peer_files(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Query(q): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let (page, limit) = clamp_pagination(q.page, q.limit);
    let files = state.catalog.list_files_for_peer_page(&peer_id, page, limit).await?;
    Ok(Json(files))
}
