//! Row types for the catalog store. Plain data; reconciliation and
//! lifecycle rules live in the owning components (`registry`, `indexer`,
//! `transfer`), matching the teacher's separation of DTOs (`peer_health.rs`'s
//! `PeerMetrics`) from the managers that mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PeerRow {
    pub peer_id: String,
    pub host: String,
    pub port: i64,
    pub grpc_port: Option<i64>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSource {
    Indexed,
    Upload,
}

impl FileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSource::Indexed => "indexed",
            FileSource::Upload => "upload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "indexed" => Some(FileSource::Indexed),
            "upload" => Some(FileSource::Upload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub peer_id: String,
    pub size: i64,
    pub is_available: bool,
    pub source: String,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRow {
    pub fn source(&self) -> FileSource {
        FileSource::from_str(&self.source).unwrap_or(FileSource::Indexed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Download,
    Upload,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Download => "download",
            TransferType::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Initiated => "initiated",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TransferStatus::Pending,
            "initiated" => TransferStatus::Initiated,
            "in_progress" => TransferStatus::InProgress,
            "completed" => TransferStatus::Completed,
            "failed" => TransferStatus::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TransferLogRow {
    pub id: i64,
    pub file_hash: String,
    pub source_peer_id: Option<String>,
    pub target_peer_id: Option<String>,
    pub transfer_type: String,
    pub status: String,
    pub bytes_transferred: i64,
    pub total_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TransferLogRow {
    pub fn status(&self) -> TransferStatus {
        TransferStatus::from_str(&self.status).unwrap_or(TransferStatus::Pending)
    }

    pub fn progress(&self) -> f64 {
        if self.total_bytes <= 0 {
            return 0.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Peer view with an aggregated file count, computed via a single join
/// (spec.md §4.1: "no N+1").
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub host: String,
    pub port: i64,
    pub grpc_port: Option<i64>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub files_count: i64,
}
