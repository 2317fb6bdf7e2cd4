//! The coordinator's view of a peer's REST surface (spec.md §4.6).
//!
//! Expressed as a trait so the registry, indexer, transfer manager, and
//! download proxy can all be exercised in tests against an in-memory fake
//! instead of a real socket, the way the teacher crate puts protocol I/O
//! behind `ProtocolHandler` (`protocols/http.rs`, `#[async_trait]`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFileEntry {
    pub filename: String,
    pub hash: String,
    pub size: i64,
    pub is_available: bool,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteHealth {
    pub peer_id: String,
    pub files_count: i64,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AppError>> + Send>>;

pub struct RemoteDownload {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

#[async_trait]
pub trait PeerHttpClient: Send + Sync {
    async fn health(&self, base_url: &str, timeout: Duration) -> Result<RemoteHealth, AppError>;

    async fn list_files(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Vec<RemoteFileEntry>, AppError>;

    async fn upload(
        &self,
        base_url: &str,
        filename: &str,
        file_hash: &str,
        bytes: Bytes,
        timeout: Duration,
    ) -> Result<(), AppError>;

    async fn download(
        &self,
        base_url: &str,
        file_hash: &str,
        connect_timeout: Duration,
    ) -> Result<RemoteDownload, AppError>;
}

/// Production implementation, backed by a shared `reqwest::Client`.
pub struct ReqwestPeerClient {
    client: reqwest::Client,
}

impl ReqwestPeerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestPeerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerHttpClient for ReqwestPeerClient {
    async fn health(&self, base_url: &str, timeout: Duration) -> Result<RemoteHealth, AppError> {
        let resp = self
            .client
            .get(format!("{base_url}/api/health"))
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::TransportFailure(format!(
                "health probe returned {}",
                resp.status()
            )));
        }
        Ok(resp.json::<RemoteHealth>().await?)
    }

    async fn list_files(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Vec<RemoteFileEntry>, AppError> {
        #[derive(Deserialize)]
        struct FilesResponse {
            files: Vec<RemoteFileEntry>,
        }
        let resp = self
            .client
            .get(format!("{base_url}/api/files"))
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::TransportFailure(format!(
                "file list fetch returned {}",
                resp.status()
            )));
        }
        Ok(resp.json::<FilesResponse>().await?.files)
    }

    async fn upload(
        &self,
        base_url: &str,
        filename: &str,
        file_hash: &str,
        bytes: Bytes,
        timeout: Duration,
    ) -> Result<(), AppError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("file_hash", file_hash.to_string());
        let resp = self
            .client
            .post(format!("{base_url}/api/upload"))
            .timeout(timeout)
            .multipart(form)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AppError::TransportFailure(format!(
                "upload returned {}",
                resp.status()
            )))
        }
    }

    async fn download(
        &self,
        base_url: &str,
        file_hash: &str,
        connect_timeout: Duration,
    ) -> Result<RemoteDownload, AppError> {
        use futures_util::StreamExt;

        let resp = self
            .client
            .get(format!("{base_url}/api/download/{file_hash}"))
            .timeout(connect_timeout)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(AppError::TransportFailure(format!(
                "download from peer returned {status}"
            )));
        }
        let content_length = resp.content_length();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::from))
            .boxed();
        Ok(RemoteDownload {
            status,
            content_length,
            body,
        })
    }
}
