//! The Download Proxy (spec.md §4.5): resolve a content hash to its owning
//! peer and relay the byte stream to the caller without materializing the
//! file at the coordinator.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Catalog;
use crate::error::{AppError, AppResult};
use crate::httpclient::{PeerHttpClient, RemoteDownload};
use crate::registry::PeerRegistry;

pub struct DownloadProxy {
    catalog: Catalog,
    registry: Arc<PeerRegistry>,
    http: Arc<dyn PeerHttpClient>,
    config: Config,
}

pub struct ProxiedDownload {
    pub filename: String,
    pub content_length: Option<u64>,
    pub stream: RemoteDownload,
}

impl DownloadProxy {
    pub fn new(
        catalog: Catalog,
        registry: Arc<PeerRegistry>,
        http: Arc<dyn PeerHttpClient>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            registry,
            http,
            config,
        }
    }

    /// Resolve `file_hash` to its owning, online peer and open a streaming
    /// GET to that peer's download endpoint. No disk write happens at the
    /// coordinator; the caller relays `stream` onward in ≤8 KiB chunks.
    pub async fn open(&self, file_hash: &str) -> AppResult<ProxiedDownload> {
        let file = self
            .catalog
            .find_any_owner(file_hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {file_hash} not found")))?;

        if !self.registry.is_online(&file.peer_id).await? {
            return Err(AppError::PeerUnavailable(format!(
                "peer {} holding {file_hash} is not online",
                file.peer_id
            )));
        }

        let base_url = self.registry.get_base_url(&file.peer_id).await?;
        let remote = self
            .http
            .download(&base_url, file_hash, self.config.download_connect_timeout)
            .await?;

        if remote.status != 200 {
            return Err(AppError::TransportFailure(format!(
                "peer {} returned status {}",
                file.peer_id, remote.status
            )));
        }

        let content_length = remote.content_length.or(Some(file.size as u64));
        Ok(ProxiedDownload {
            filename: file.filename,
            content_length,
            stream: remote,
        })
    }
}

/// Chunk size used when relaying the proxied body onward (spec.md §4.5:
/// "in chunks of ≤ 8 KiB").
pub const RELAY_CHUNK_SIZE: usize = 8 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::httpclient::{ByteStream, RemoteFileEntry, RemoteHealth};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FakeHttp {
        body: &'static [u8],
        status: u16,
    }

    #[async_trait]
    impl PeerHttpClient for FakeHttp {
        async fn health(&self, _: &str, _: Duration) -> AppResult<RemoteHealth> {
            Ok(RemoteHealth { peer_id: "peer1".into(), files_count: 0 })
        }
        async fn list_files(&self, _: &str, _: Duration) -> AppResult<Vec<RemoteFileEntry>> {
            Ok(vec![])
        }
        async fn upload(&self, _: &str, _: &str, _: &str, _: Bytes, _: Duration) -> AppResult<()> {
            Ok(())
        }
        async fn download(&self, _: &str, _: &str, _: Duration) -> AppResult<RemoteDownload> {
            if self.status != 200 {
                return Err(AppError::TransportFailure(format!("status {}", self.status)));
            }
            let body = self.body;
            let stream: ByteStream = Box::pin(futures::stream::once(async move {
                Ok(Bytes::from_static(body))
            }));
            Ok(RemoteDownload {
                status: self.status,
                content_length: Some(body.len() as u64),
                body: stream,
            })
        }
    }

    async fn setup(status: u16) -> DownloadProxy {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_peer("peer1", "localhost", 8001, None).await.unwrap();
        let hash = "e".repeat(64);
        catalog
            .insert_indexed_file("peer1", "a.txt", &hash, 4, true, chrono::Utc::now(), crate::db::models::FileSource::Indexed)
            .await
            .unwrap();
        let http: Arc<dyn PeerHttpClient> = Arc::new(FakeHttp { body: b"DATA", status });
        let config = Config::from_env();
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = Arc::new(PeerRegistry::new(catalog.clone(), http.clone(), config.clone(), tx));
        DownloadProxy::new(catalog, registry, http, config)
    }

    #[tokio::test]
    async fn streams_bytes_for_known_available_file() {
        let proxy = setup(200).await;
        let hash = "e".repeat(64);
        let result = proxy.open(&hash).await.unwrap();
        assert_eq!(result.filename, "a.txt");
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let proxy = setup(200).await;
        let err = proxy.open(&"f".repeat(64)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn offline_owner_yields_peer_unavailable() {
        let proxy = setup(200).await;
        proxy.catalog.mark_peer_offline("peer1").await.unwrap();
        let hash = "e".repeat(64);
        let err = proxy.open(&hash).await.unwrap_err();
        assert!(matches!(err, AppError::PeerUnavailable(_)));
    }
}
