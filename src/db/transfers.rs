use super::models::{TransferLogRow, TransferStatus, TransferType};
use super::Catalog;
use crate::error::AppResult;
use chrono::Utc;

impl Catalog {
    pub async fn create_transfer_log(
        &self,
        file_hash: &str,
        source_peer_id: Option<&str>,
        target_peer_id: Option<&str>,
        transfer_type: TransferType,
        total_bytes: i64,
    ) -> AppResult<i64> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO transfer_logs (file_hash, source_peer_id, target_peer_id, \
             transfer_type, status, bytes_transferred, total_bytes, started_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(file_hash)
        .bind(source_peer_id)
        .bind(target_peer_id)
        .bind(transfer_type.as_str())
        .bind(TransferStatus::Pending.as_str())
        .bind(total_bytes)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn get_transfer_log(&self, id: i64) -> AppResult<Option<TransferLogRow>> {
        let row = sqlx::query_as::<_, TransferLogRow>("SELECT * FROM transfer_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn set_transfer_status(&self, id: i64, status: TransferStatus) -> AppResult<()> {
        sqlx::query("UPDATE transfer_logs SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_transfer_progress(
        &self,
        id: i64,
        bytes_transferred: i64,
        status: TransferStatus,
    ) -> AppResult<()> {
        let completed_at = if status == TransferStatus::Completed {
            Some(Utc::now())
        } else {
            None
        };
        sqlx::query(
            "UPDATE transfer_logs SET bytes_transferred = ?, status = ?, completed_at = ? \
             WHERE id = ?",
        )
        .bind(bytes_transferred)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_transfer(&self, id: i64, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE transfer_logs SET status = ?, error_message = ?, completed_at = ? \
             WHERE id = ?",
        )
        .bind(TransferStatus::Failed.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_active_transfers(&self) -> AppResult<Vec<TransferLogRow>> {
        let rows = sqlx::query_as::<_, TransferLogRow>(
            "SELECT * FROM transfer_logs WHERE status IN ('pending', 'initiated', 'in_progress') \
             ORDER BY started_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn transfer_history(
        &self,
        peer_id: Option<&str>,
        limit: u32,
    ) -> AppResult<Vec<TransferLogRow>> {
        let rows = if let Some(peer_id) = peer_id {
            sqlx::query_as::<_, TransferLogRow>(
                "SELECT * FROM transfer_logs WHERE source_peer_id = ? OR target_peer_id = ? \
                 ORDER BY started_at DESC LIMIT ?",
            )
            .bind(peer_id)
            .bind(peer_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, TransferLogRow>(
                "SELECT * FROM transfer_logs ORDER BY started_at DESC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }
}
