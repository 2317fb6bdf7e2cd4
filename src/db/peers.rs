use super::models::{PeerInfo, PeerRow};
use super::Catalog;
use crate::error::AppResult;
use chrono::Utc;

impl Catalog {
    /// Upsert a peer row. Returns `true` if this was a fresh registration.
    pub async fn upsert_peer(
        &self,
        peer_id: &str,
        host: &str,
        port: u16,
        grpc_port: Option<u16>,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let existing = self.get_peer(peer_id).await?;
        if existing.is_some() {
            sqlx::query(
                "UPDATE peers SET host = ?, port = ?, grpc_port = ?, is_online = 1, \
                 last_seen = ?, updated_at = ? WHERE peer_id = ?",
            )
            .bind(host)
            .bind(port as i64)
            .bind(grpc_port.map(|p| p as i64))
            .bind(now)
            .bind(now)
            .bind(peer_id)
            .execute(&self.pool)
            .await?;
            Ok(false)
        } else {
            sqlx::query(
                "INSERT INTO peers (peer_id, host, port, grpc_port, is_online, last_seen, \
                 created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
            )
            .bind(peer_id)
            .bind(host)
            .bind(port as i64)
            .bind(grpc_port.map(|p| p as i64))
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(true)
        }
    }

    pub async fn get_peer(&self, peer_id: &str) -> AppResult<Option<PeerRow>> {
        let row = sqlx::query_as::<_, PeerRow>("SELECT * FROM peers WHERE peer_id = ?")
            .bind(peer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Flip `is_online = false`. Never deletes the row (spec.md §3).
    pub async fn mark_peer_offline(&self, peer_id: &str) -> AppResult<bool> {
        let result = sqlx::query("UPDATE peers SET is_online = 0, updated_at = ? WHERE peer_id = ?")
            .bind(Utc::now())
            .bind(peer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_peer_online(&self, peer_id: &str, online: bool) -> AppResult<()> {
        sqlx::query(
            "UPDATE peers SET is_online = ?, last_seen = ?, updated_at = ? WHERE peer_id = ?",
        )
        .bind(online)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(peer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_peers(&self, online_only: bool) -> AppResult<Vec<PeerInfo>> {
        let sql = if online_only {
            "SELECT p.peer_id, p.host, p.port, p.grpc_port, p.is_online, p.last_seen, \
             COUNT(f.id) AS files_count \
             FROM peers p LEFT JOIN files f ON f.peer_id = p.peer_id AND f.is_available = 1 \
             WHERE p.is_online = 1 \
             GROUP BY p.peer_id"
        } else {
            "SELECT p.peer_id, p.host, p.port, p.grpc_port, p.is_online, p.last_seen, \
             COUNT(f.id) AS files_count \
             FROM peers p LEFT JOIN files f ON f.peer_id = p.peer_id AND f.is_available = 1 \
             GROUP BY p.peer_id"
        };
        let rows = sqlx::query_as::<_, PeerInfo>(sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn list_all_peers(&self) -> AppResult<Vec<PeerInfo>> {
        self.list_peers(false).await
    }

    pub async fn list_online_peers(&self) -> AppResult<Vec<PeerInfo>> {
        self.list_peers(true).await
    }

    pub async fn peer_files_count(&self, peer_id: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE peer_id = ? AND is_available = 1",
        )
        .bind(peer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_twice_updates_single_row() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let created = catalog.upsert_peer("peer1", "host-a", 8001, None).await.unwrap();
        assert!(created);
        let created_again = catalog
            .upsert_peer("peer1", "host-b", 9001, Some(50051))
            .await
            .unwrap();
        assert!(!created_again);

        let peers = catalog.list_all_peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].host, "host-b");
        assert_eq!(peers[0].port, 9001);
    }

    #[tokio::test]
    async fn unregister_does_not_delete() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_peer("peer1", "host-a", 8001, None).await.unwrap();
        let existed = catalog.mark_peer_offline("peer1").await.unwrap();
        assert!(existed);
        let peer = catalog.get_peer("peer1").await.unwrap().unwrap();
        assert!(!peer.is_online);
    }
}
