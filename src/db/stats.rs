use serde::Serialize;

use super::Catalog;
use crate::error::AppResult;

/// Aggregate counters backing `GET /api/stats` (SPEC_FULL.md §B.2).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SystemStats {
    pub total_peers: i64,
    pub online_peers: i64,
    pub total_files: i64,
    pub total_bytes_indexed: i64,
    pub active_transfers: i64,
    pub completed_transfers: i64,
}

impl Catalog {
    pub async fn system_stats(&self) -> AppResult<SystemStats> {
        let total_peers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM peers")
            .fetch_one(&self.pool)
            .await?;
        let online_peers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM peers WHERE is_online = 1")
            .fetch_one(&self.pool)
            .await?;
        let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE is_available = 1")
            .fetch_one(&self.pool)
            .await?;
        let total_bytes_indexed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size), 0) FROM files WHERE is_available = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        let active_transfers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfer_logs WHERE status IN ('pending', 'initiated', 'in_progress')",
        )
        .fetch_one(&self.pool)
        .await?;
        let completed_transfers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfer_logs WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SystemStats {
            total_peers,
            online_peers,
            total_files,
            total_bytes_indexed,
            active_transfers,
            completed_transfers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::FileSource;
    use chrono::Utc;

    #[tokio::test]
    async fn counts_reflect_inserted_rows() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_peer("peer1", "host", 8001, None).await.unwrap();
        catalog
            .insert_indexed_file("peer1", "a.txt", &"a".repeat(64), 10, true, Utc::now(), FileSource::Indexed)
            .await
            .unwrap();

        let stats = catalog.system_stats().await.unwrap();
        assert_eq!(stats.total_peers, 1);
        assert_eq!(stats.online_peers, 1);
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_bytes_indexed, 10);
        assert_eq!(stats.active_transfers, 0);
        assert_eq!(stats.completed_transfers, 0);
    }
}
