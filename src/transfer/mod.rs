//! The Transfer Manager (spec.md §4.4): the TransferLog state machine,
//! download/upload initiation, in-memory progress, and history queries.

pub mod upload;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::models::{TransferLogRow, TransferStatus, TransferType};
use crate::db::Catalog;
use crate::error::{AppError, AppResult};
use crate::httpclient::PeerHttpClient;
use crate::indexer::FileIndexer;
use crate::registry::PeerRegistry;
use crate::validation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DownloadResponse {
    pub transfer_id: i64,
    pub file_hash: String,
    pub filename: String,
    pub size: i64,
    pub source_peer_id: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UploadResponse {
    pub transfer_id: i64,
    pub file_hash: String,
    pub filename: String,
    pub size: i64,
    pub target_peer_id: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TransferStatusView {
    pub id: i64,
    pub file_hash: String,
    pub transfer_type: String,
    pub status: String,
    pub bytes_transferred: i64,
    pub total_bytes: i64,
    pub progress: f64,
    pub error_message: Option<String>,
}

/// The in-memory mirror of an active TransferLog (spec.md §3): authoritative
/// for in-flight progress; the DB remains authoritative for persistence.
#[derive(Debug, Clone)]
struct LiveTransfer {
    file_hash: String,
    transfer_type: TransferType,
    status: TransferStatus,
    bytes_transferred: i64,
    total_bytes: i64,
    error_message: Option<String>,
}

impl LiveTransfer {
    fn into_view(self, id: i64) -> TransferStatusView {
        let progress = if self.total_bytes > 0 {
            (self.bytes_transferred as f64 / self.total_bytes as f64).min(1.0)
        } else {
            0.0
        };
        TransferStatusView {
            id,
            file_hash: self.file_hash,
            transfer_type: self.transfer_type.as_str().to_string(),
            status: self.status.as_str().to_string(),
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            progress,
            error_message: self.error_message,
        }
    }
}

impl From<TransferLogRow> for TransferStatusView {
    fn from(row: TransferLogRow) -> Self {
        let progress = row.progress();
        TransferStatusView {
            id: row.id,
            file_hash: row.file_hash,
            transfer_type: row.transfer_type,
            status: row.status,
            bytes_transferred: row.bytes_transferred,
            total_bytes: row.total_bytes,
            progress,
            error_message: row.error_message,
        }
    }
}

pub struct TransferManager {
    catalog: Catalog,
    registry: Arc<PeerRegistry>,
    indexer: Arc<FileIndexer>,
    http: Arc<dyn PeerHttpClient>,
    config: Config,
    live: Mutex<HashMap<i64, LiveTransfer>>,
}

impl TransferManager {
    pub fn new(
        catalog: Catalog,
        registry: Arc<PeerRegistry>,
        indexer: Arc<FileIndexer>,
        http: Arc<dyn PeerHttpClient>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            registry,
            indexer,
            http,
            config,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Given `(file_hash, requesting_peer_id)`, resolve the owning peer and
    /// register the download (spec.md §4.4). The Download Proxy performs
    /// the actual byte relay separately.
    pub async fn initiate_download(
        &self,
        file_hash: &str,
        _requesting_peer_id: &str,
    ) -> AppResult<DownloadResponse> {
        validation::validate_file_hash(file_hash).map_err(AppError::InvalidInput)?;

        let file = self
            .catalog
            .find_any_owner(file_hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {file_hash} not found")))?;

        if !self.registry.is_online(&file.peer_id).await? {
            return Err(AppError::PeerUnavailable(format!(
                "source peer {} is not available",
                file.peer_id
            )));
        }

        let id = self
            .catalog
            .create_transfer_log(
                file_hash,
                Some(&file.peer_id),
                None,
                TransferType::Download,
                file.size,
            )
            .await?;
        self.catalog.set_transfer_status(id, TransferStatus::Initiated).await?;

        self.live.lock().await.insert(
            id,
            LiveTransfer {
                file_hash: file_hash.to_string(),
                transfer_type: TransferType::Download,
                status: TransferStatus::Initiated,
                bytes_transferred: 0,
                total_bytes: file.size,
                error_message: None,
            },
        );

        Ok(DownloadResponse {
            transfer_id: id,
            file_hash: file_hash.to_string(),
            filename: file.filename,
            size: file.size,
            source_peer_id: file.peer_id,
            download_url: format!("/api/download/{file_hash}"),
        })
    }

    /// Validate and place an upload on the target peer (spec.md §4.4).
    /// `declared_hash` must match the SHA-256 of `bytes`; extension and
    /// size are checked against the allow-list/bounds before any network
    /// call is made.
    pub async fn initiate_upload(
        &self,
        filename: &str,
        declared_hash: &str,
        target_peer_id: &str,
        bytes: Bytes,
    ) -> AppResult<UploadResponse> {
        validation::validate_filename(filename).map_err(AppError::InvalidInput)?;
        validation::validate_size(bytes.len() as u64).map_err(AppError::InvalidInput)?;
        validation::validate_file_hash(declared_hash).map_err(AppError::InvalidInput)?;

        let actual_hash = sha256_hex(&bytes);
        if actual_hash != declared_hash.to_lowercase() {
            return Err(AppError::InvalidInput(
                "declared file_hash does not match SHA-256 of payload".to_string(),
            ));
        }

        if !self.registry.is_online(target_peer_id).await? {
            return Err(AppError::PeerUnavailable(format!(
                "target peer {target_peer_id} is not available"
            )));
        }

        let size = bytes.len() as i64;
        let id = self
            .catalog
            .create_transfer_log(
                declared_hash,
                None,
                Some(target_peer_id),
                TransferType::Upload,
                size,
            )
            .await?;
        self.catalog.set_transfer_status(id, TransferStatus::Initiated).await?;
        self.track_live(id, declared_hash, TransferType::Upload, 0, size).await;

        let base_url = self.registry.get_base_url(target_peer_id).await?;

        let placed = upload::place_on_peer(
            self.http.as_ref(),
            &base_url,
            filename,
            declared_hash,
            bytes,
            self.config.upload_attempt_timeout,
        )
        .await;

        match placed {
            Ok(()) => {
                self.catalog
                    .update_transfer_progress(id, size, TransferStatus::Completed)
                    .await?;
                self.track_live(id, declared_hash, TransferType::Upload, size, size).await;

                if let Err(err) = self
                    .indexer
                    .index_uploaded_file(target_peer_id, filename, declared_hash, size)
                    .await
                {
                    tracing::warn!(%err, "upload succeeded but post-upload indexing failed");
                }

                Ok(UploadResponse {
                    transfer_id: id,
                    file_hash: declared_hash.to_string(),
                    filename: filename.to_string(),
                    size,
                    target_peer_id: target_peer_id.to_string(),
                    status: "completed",
                })
            }
            Err(err) => {
                self.catalog.fail_transfer(id, &err.to_string()).await?;
                self.fail_live(id, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn track_live(
        &self,
        id: i64,
        file_hash: &str,
        transfer_type: TransferType,
        bytes_transferred: i64,
        total_bytes: i64,
    ) {
        let status = if bytes_transferred >= total_bytes && total_bytes > 0 {
            TransferStatus::Completed
        } else {
            TransferStatus::InProgress
        };
        self.live.lock().await.insert(
            id,
            LiveTransfer {
                file_hash: file_hash.to_string(),
                transfer_type,
                status,
                bytes_transferred,
                total_bytes,
                error_message: None,
            },
        );
    }

    async fn fail_live(&self, id: i64, message: &str) {
        let mut live = self.live.lock().await;
        if let Some(entry) = live.get_mut(&id) {
            entry.status = TransferStatus::Failed;
            entry.error_message = Some(message.to_string());
        }
    }

    pub async fn get_status(&self, id: i64) -> AppResult<TransferStatusView> {
        if let Some(live) = self.live.lock().await.get(&id).cloned() {
            return Ok(live.into_view(id));
        }
        let row = self
            .catalog
            .get_transfer_log(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transfer {id} not found")))?;
        Ok(row.into())
    }

    /// In-memory view when present, else the DB-derived view of non-terminal
    /// statuses (spec.md §4.4).
    pub async fn list_active(&self) -> AppResult<Vec<TransferStatusView>> {
        let live = self.live.lock().await;
        if !live.is_empty() {
            return Ok(live
                .iter()
                .filter(|(_, t)| !t.status.is_terminal())
                .map(|(id, t)| t.clone().into_view(*id))
                .collect());
        }
        drop(live);
        let rows = self.catalog.list_active_transfers().await?;
        Ok(rows.into_iter().map(TransferStatusView::from).collect())
    }

    pub async fn history(&self, peer_id: Option<&str>, limit: u32) -> AppResult<Vec<TransferStatusView>> {
        let rows = self.catalog.transfer_history(peer_id, limit).await?;
        Ok(rows.into_iter().map(TransferStatusView::from).collect())
    }
}

fn sha256_hex(bytes: &Bytes) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
