use super::models::{FileRow, FileSource};
use super::{Catalog, SearchFilter};
use crate::error::AppResult;
use chrono::{DateTime, Utc};

pub struct SearchOutcome {
    pub files: Vec<FileRow>,
    pub search_time: std::time::Duration,
}

impl Catalog {
    pub async fn get_file_by_hash_and_peer(
        &self,
        file_hash: &str,
        peer_id: &str,
    ) -> AppResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE file_hash = ? AND peer_id = ?",
        )
        .bind(file_hash)
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Any row owning this hash, regardless of peer — used to resolve a
    /// download target (spec.md §4.4/§4.5).
    pub async fn find_any_owner(&self, file_hash: &str) -> AppResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE file_hash = ? AND is_available = 1 LIMIT 1",
        )
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_files_for_peer(&self, peer_id: &str) -> AppResult<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE peer_id = ?")
            .bind(peer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_files_for_peer_page(
        &self,
        peer_id: &str,
        page: u32,
        limit: u32,
    ) -> AppResult<Vec<FileRow>> {
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE peer_id = ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(peer_id)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_indexed_file(
        &self,
        peer_id: &str,
        filename: &str,
        file_hash: &str,
        size: i64,
        is_available: bool,
        last_modified: DateTime<Utc>,
        source: FileSource,
    ) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO files (filename, file_hash, peer_id, size, is_available, source, \
             last_modified, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(file_hash)
        .bind(peer_id)
        .bind(size)
        .bind(is_available)
        .bind(source.as_str())
        .bind(last_modified)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update an existing `source=indexed` row's mutable fields
    /// (spec.md §4.3 step 3). Callers must not invoke this on an
    /// `upload`-provenance row.
    pub async fn update_indexed_file(
        &self,
        id: i64,
        filename: &str,
        size: i64,
        is_available: bool,
        last_modified: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE files SET filename = ?, size = ?, is_available = ?, last_modified = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(filename)
        .bind(size)
        .bind(is_available)
        .bind(last_modified)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_file_unavailable(&self, id: i64) -> AppResult<()> {
        sqlx::query("UPDATE files SET is_available = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn search(&self, filter: &SearchFilter) -> AppResult<SearchOutcome> {
        let started = std::time::Instant::now();

        let mut sql = String::from("SELECT * FROM files WHERE is_available = 1");
        if filter.filename.is_some() {
            sql.push_str(" AND filename LIKE ?");
        }
        if filter.file_hash.is_some() {
            sql.push_str(" AND file_hash = ?");
        }
        if filter.min_size.is_some() {
            sql.push_str(" AND size >= ?");
        }
        if filter.max_size.is_some() {
            sql.push_str(" AND size <= ?");
        }
        if filter.peer_id.is_some() {
            sql.push_str(" AND peer_id = ?");
        }

        let mut query = sqlx::query_as::<_, FileRow>(&sql);
        if let Some(name) = &filter.filename {
            query = query.bind(format!("%{name}%"));
        }
        if let Some(hash) = &filter.file_hash {
            query = query.bind(hash.clone());
        }
        if let Some(min) = filter.min_size {
            query = query.bind(min);
        }
        if let Some(max) = filter.max_size {
            query = query.bind(max);
        }
        if let Some(peer_id) = &filter.peer_id {
            query = query.bind(peer_id.clone());
        }

        let files = query.fetch_all(&self.pool).await?;
        let search_time = started.elapsed();

        let _ = sqlx::query(
            "INSERT INTO search_logs (filter_json, result_count, search_time_ms, logged_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(serde_json::to_string(filter).unwrap_or_default())
        .bind(files.len() as i64)
        .bind(search_time.as_secs_f64() * 1000.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        Ok(SearchOutcome { files, search_time })
    }
}
