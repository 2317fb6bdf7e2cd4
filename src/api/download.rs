use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, AppResult};
use crate::proxy::RELAY_CHUNK_SIZE;
use crate::state::AppState;

/// `GET /api/download/{file_hash}`: relay the proxied peer stream straight
/// through to the caller in ≤8 KiB chunks (spec.md §4.5), never buffering
/// the whole file at the coordinator.
pub async fn download(
    State(state): State<AppState>,
    Path(file_hash): Path<String>,
) -> AppResult<impl IntoResponse> {
    let proxied = state.proxy.open(&file_hash).await?;

    let rechunked = proxied
        .stream
        .body
        .map(|item| -> stream::BoxStream<'static, Result<Bytes, AppError>> {
            match item {
                Ok(bytes) => stream::iter(split_into_chunks(bytes).into_iter().map(Ok)).boxed(),
                Err(err) => stream::iter(vec![Err(err)]).boxed(),
            }
        })
        .flatten();

    let mut builder = Response::builder().header(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", proxied.filename),
    );
    builder = builder.header(header::CONTENT_TYPE, "application/octet-stream");
    if let Some(len) = proxied.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(rechunked))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn split_into_chunks(mut bytes: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    while !bytes.is_empty() {
        let n = bytes.len().min(RELAY_CHUNK_SIZE);
        chunks.push(bytes.split_to(n));
    }
    chunks
}
