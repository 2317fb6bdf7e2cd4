//! The File Indexer (spec.md §4.3): pulls each peer's file list and
//! reconciles it against the catalog under the provenance rules that keep
//! `source=upload` rows immune to a subsequent crawl.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::db::models::FileSource;
use crate::db::Catalog;
use crate::error::{AppError, AppResult};
use crate::httpclient::PeerHttpClient;

pub struct FileIndexer {
    catalog: Catalog,
    http: Arc<dyn PeerHttpClient>,
    config: Config,
}

impl FileIndexer {
    pub fn new(catalog: Catalog, http: Arc<dyn PeerHttpClient>, config: Config) -> Self {
        Self { catalog, http, config }
    }

    /// Reconcile one peer's file list into the catalog (spec.md §4.3 steps
    /// 1-5), committed as a sequence of short-lived statements rather than
    /// a single long transaction — matching the catalog's "no long-held
    /// write locks" policy (spec.md §5).
    pub async fn reindex_peer(&self, peer_id: &str) -> AppResult<()> {
        let peer = self
            .catalog
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id} not found")))?;
        let base_url = self.config.peer_base_url(peer_id, &peer.host, peer.port);

        // Step 1: existing rows for this peer.
        let existing = self.catalog.list_files_for_peer(peer_id).await?;
        let mut by_hash = HashMap::new();
        for row in existing {
            by_hash.insert(row.file_hash.clone(), row);
        }

        // Step 2: fetch the peer's current list. A fetch timeout leaves
        // existing rows untouched for this cycle (spec.md §5).
        let fetched = self
            .http
            .list_files(&base_url, self.config.indexer_fetch_timeout)
            .await?;

        let mut seen_hashes = std::collections::HashSet::new();

        // Step 3: reconcile each fetched entry.
        for entry in &fetched {
            seen_hashes.insert(entry.hash.clone());
            match by_hash.get(&entry.hash) {
                None => {
                    self.catalog
                        .insert_indexed_file(
                            peer_id,
                            &entry.filename,
                            &entry.hash,
                            entry.size,
                            entry.is_available,
                            entry.last_modified,
                            FileSource::Indexed,
                        )
                        .await?;
                }
                Some(row) if row.source() == FileSource::Indexed => {
                    self.catalog
                        .update_indexed_file(
                            row.id,
                            &entry.filename,
                            entry.size,
                            entry.is_available,
                            entry.last_modified,
                        )
                        .await?;
                }
                Some(_upload_row) => {
                    // source=upload dominates: left untouched.
                }
            }
        }

        // Step 4: anything not observed in this cycle is marked unavailable,
        // regardless of provenance.
        for (hash, row) in &by_hash {
            if !seen_hashes.contains(hash) && row.is_available {
                self.catalog.mark_file_unavailable(row.id).await?;
            }
        }

        info!(peer_id, fetched = fetched.len(), "reindexed peer");
        Ok(())
    }

    /// Index a single freshly-uploaded file without reconciling the rest of
    /// the peer's catalog (spec.md §4.4: "immediate, single-entry").
    pub async fn index_uploaded_file(
        &self,
        peer_id: &str,
        filename: &str,
        file_hash: &str,
        size: i64,
    ) -> AppResult<()> {
        if self
            .catalog
            .get_file_by_hash_and_peer(file_hash, peer_id)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidInput(format!(
                "file {file_hash} already registered for peer {peer_id}"
            )));
        }
        self.catalog
            .insert_indexed_file(
                peer_id,
                filename,
                file_hash,
                size,
                true,
                chrono::Utc::now(),
                FileSource::Upload,
            )
            .await
    }

    /// Fan out reindexing across the current online set concurrently; one
    /// peer's failure never blocks the others (spec.md §4.3).
    pub async fn index_all(&self) -> AppResult<HashMap<String, bool>> {
        let online = self.catalog.list_online_peers().await?;
        let futures = online.into_iter().map(|peer| async move {
            let result = self.reindex_peer(&peer.peer_id).await;
            if let Err(err) = &result {
                warn!(peer_id = %peer.peer_id, %err, "reindex failed");
            }
            (peer.peer_id, result.is_ok())
        });
        let results = futures::future::join_all(futures).await;
        Ok(results.into_iter().collect())
    }

    /// Background loop driven by the registry's post-register reindex
    /// signal; exits once the channel closes at shutdown.
    pub async fn run_reindex_loop(self: Arc<Self>, mut rx: tokio::sync::mpsc::UnboundedReceiver<String>) {
        while let Some(peer_id) = rx.recv().await {
            if let Err(err) = self.reindex_peer(&peer_id).await {
                warn!(peer_id, %err, "triggered reindex failed");
            }
        }
        info!("reindex loop shutting down: channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::httpclient::{RemoteDownload, RemoteFileEntry, RemoteHealth};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeHttp {
        files: StdMutex<Vec<RemoteFileEntry>>,
    }

    #[async_trait]
    impl PeerHttpClient for FakeHttp {
        async fn health(&self, _: &str, _: Duration) -> AppResult<RemoteHealth> {
            Ok(RemoteHealth { peer_id: "peer1".into(), files_count: 0 })
        }
        async fn list_files(&self, _: &str, _: Duration) -> AppResult<Vec<RemoteFileEntry>> {
            Ok(self.files.lock().unwrap().clone())
        }
        async fn upload(&self, _: &str, _: &str, _: &str, _: bytes::Bytes, _: Duration) -> AppResult<()> {
            Ok(())
        }
        async fn download(&self, _: &str, _: &str, _: Duration) -> AppResult<RemoteDownload> {
            Err(AppError::NotFound("unused".into()))
        }
    }

    fn entry(name: &str, hash: &str) -> RemoteFileEntry {
        RemoteFileEntry {
            filename: name.to_string(),
            hash: hash.to_string(),
            size: 4,
            is_available: true,
            last_modified: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reindex_inserts_then_marks_unavailable_when_dropped() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_peer("peer1", "localhost", 8001, None).await.unwrap();
        let hash = "a".repeat(64);
        let http = Arc::new(FakeHttp { files: StdMutex::new(vec![entry("a.txt", &hash)]) });
        let indexer = FileIndexer::new(catalog.clone(), http.clone(), Config::from_env());

        indexer.reindex_peer("peer1").await.unwrap();
        let files = catalog.list_files_for_peer("peer1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_available);

        http.files.lock().unwrap().clear();
        indexer.reindex_peer("peer1").await.unwrap();
        let files = catalog.list_files_for_peer("peer1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].is_available);
    }

    #[tokio::test]
    async fn upload_provenance_survives_reindex() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_peer("peer1", "localhost", 8001, None).await.unwrap();
        let http = Arc::new(FakeHttp { files: StdMutex::new(vec![]) });
        let indexer = FileIndexer::new(catalog.clone(), http, Config::from_env());

        let hash = "b".repeat(64);
        indexer
            .index_uploaded_file("peer1", "u.txt", &hash, 42)
            .await
            .unwrap();

        // Peer's crawl reports an empty list.
        indexer.reindex_peer("peer1").await.unwrap();

        let files = catalog.list_files_for_peer("peer1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source(), FileSource::Upload);
        assert!(!files[0].is_available);
    }
}
