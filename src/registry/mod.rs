//! The Peer Registry (spec.md §4.1): authoritative peer list, liveness
//! probing, and the reconnect back-off state machine.
//!
//! Built as an explicitly constructed service struct passed around via
//! `Arc`, per the REDESIGN FLAGS in spec.md §9 ("Replace [global
//! singletons] with an explicitly constructed service struct passed via
//! dependency injection"). Background work is a spawned task observing a
//! `watch`-based shutdown flag, the same shape `headless.rs` uses for its
//! long-running loops.

pub mod backoff;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::models::PeerInfo;
use crate::db::Catalog;
use crate::error::{AppError, AppResult};
use crate::httpclient::PeerHttpClient;
use crate::validation;

use backoff::{ConnectionState, ReconnectState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PeerStatus {
    pub peer_id: String,
    pub is_online: bool,
    pub files_count: i64,
    pub reconnect_state: &'static str,
    pub reconnect_attempts: u32,
}

pub struct PeerRegistry {
    catalog: Catalog,
    http: Arc<dyn PeerHttpClient>,
    config: Config,
    backoff: Mutex<HashMap<String, ReconnectState>>,
    reindex_tx: mpsc::UnboundedSender<String>,
}

impl PeerRegistry {
    pub fn new(
        catalog: Catalog,
        http: Arc<dyn PeerHttpClient>,
        config: Config,
        reindex_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            catalog,
            http,
            config,
            backoff: Mutex::new(HashMap::new()),
            reindex_tx,
        }
    }

    /// Upsert a peer. Registration happens-before the reindex it triggers
    /// (spec.md §5 ordering guarantee): the reindex signal is only sent
    /// after the catalog write commits.
    pub async fn register(
        &self,
        peer_id: &str,
        host: &str,
        port: u16,
        grpc_port: Option<u16>,
    ) -> AppResult<bool> {
        validation::validate_peer_id(peer_id).map_err(AppError::InvalidInput)?;
        validation::validate_host(host).map_err(AppError::InvalidInput)?;
        validation::validate_port(port).map_err(AppError::InvalidInput)?;

        let created = self.catalog.upsert_peer(peer_id, host, port, grpc_port).await?;

        {
            let mut backoff = self.backoff.lock().await;
            backoff
                .entry(peer_id.to_string())
                .or_insert_with(|| {
                    ReconnectState::new(self.config.reconnect_base_interval, self.config.reconnect_max_attempts)
                })
                .on_success();
        }

        if self.reindex_tx.send(peer_id.to_string()).is_err() {
            warn!(peer_id, "reindex channel closed, skipping post-register reindex trigger");
        }

        Ok(created)
    }

    pub async fn unregister(&self, peer_id: &str) -> AppResult<()> {
        let existed = self.catalog.mark_peer_offline(peer_id).await?;
        if !existed {
            return Err(AppError::NotFound(format!("peer {peer_id} not found")));
        }
        let mut backoff = self.backoff.lock().await;
        backoff
            .entry(peer_id.to_string())
            .or_insert_with(|| {
                ReconnectState::new(self.config.reconnect_base_interval, self.config.reconnect_max_attempts)
            })
            .on_disconnect(Instant::now());
        Ok(())
    }

    pub async fn list_all(&self) -> AppResult<Vec<PeerInfo>> {
        self.catalog.list_all_peers().await
    }

    pub async fn list_online(&self) -> AppResult<Vec<PeerInfo>> {
        self.catalog.list_online_peers().await
    }

    pub async fn is_online(&self, peer_id: &str) -> AppResult<bool> {
        let peer = self
            .catalog
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id} not found")))?;
        Ok(peer.is_online)
    }

    pub async fn get_base_url(&self, peer_id: &str) -> AppResult<String> {
        let peer = self
            .catalog
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id} not found")))?;
        Ok(self.config.peer_base_url(peer_id, &peer.host, peer.port))
    }

    /// Probe one peer's health endpoint and reconcile its `is_online` flag
    /// against the result. A transport error marks the peer offline: the
    /// defensive reading of the open question in spec.md §9/§4.1 (the
    /// source's "unreachable counts as online" behavior is not carried
    /// over — see SPEC_FULL.md §E.1).
    pub async fn status(&self, peer_id: &str) -> AppResult<PeerStatus> {
        let peer = self
            .catalog
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("peer {peer_id} not found")))?;
        let base_url = self.config.peer_base_url(peer_id, &peer.host, peer.port);

        let probe = self.http.health(&base_url, self.config.health_probe_timeout).await;
        let now_online = probe.is_ok();

        if now_online != peer.is_online {
            self.catalog.set_peer_online(peer_id, now_online).await?;
        }

        let mut backoff = self.backoff.lock().await;
        let tracker = backoff
            .entry(peer_id.to_string())
            .or_insert_with(|| {
                ReconnectState::new(self.config.reconnect_base_interval, self.config.reconnect_max_attempts)
            });
        if now_online {
            tracker.on_success();
        } else if tracker.state == ConnectionState::Connected {
            // First observed failure: open the reconnect window without
            // counting it as a failed retry attempt yet.
            tracker.on_disconnect(Instant::now());
        } else {
            // Already disconnected/reconnecting: this probe *is* the
            // scheduled retry attempt, so it counts toward max_attempts.
            tracker.on_attempt_failed(Instant::now());
        }

        let files_count = self.catalog.peer_files_count(peer_id).await?;
        Ok(PeerStatus {
            peer_id: peer_id.to_string(),
            is_online: now_online,
            files_count,
            reconnect_state: reconnect_state_label(tracker.state),
            reconnect_attempts: tracker.attempts,
        })
    }

    /// Spawn the background probe loop. Exits at its next iteration once
    /// `shutdown` observes `true` (spec.md §5: "background loops observe a
    /// shutdown flag and exit at their next iteration").
    pub fn spawn_probe_loop(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Ok(peers) = self.catalog.list_all_peers().await {
                            for peer in peers {
                                if let Err(err) = self.status(&peer.peer_id).await {
                                    warn!(peer_id = %peer.peer_id, %err, "health probe failed");
                                }
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("peer registry probe loop shutting down");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Reset a peer stuck in the `failed` reconnect state so probing
    /// resumes for it.
    pub async fn reset_backoff(&self, peer_id: &str) {
        let mut backoff = self.backoff.lock().await;
        if let Some(tracker) = backoff.get_mut(peer_id) {
            tracker.reset();
        }
    }
}

fn reconnect_state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "connected",
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Reconnecting => "reconnecting",
        ConnectionState::Failed => "failed",
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::httpclient::{RemoteHealth, RemoteFileEntry, RemoteDownload, PeerHttpClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeHttp {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl PeerHttpClient for FakeHttp {
        async fn health(&self, _base_url: &str, _timeout: Duration) -> AppResult<RemoteHealth> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(RemoteHealth { peer_id: "peer1".into(), files_count: 0 })
            } else {
                Err(AppError::TransportFailure("connection refused".into()))
            }
        }
        async fn list_files(&self, _: &str, _: Duration) -> AppResult<Vec<RemoteFileEntry>> {
            Ok(vec![])
        }
        async fn upload(&self, _: &str, _: &str, _: &str, _: bytes::Bytes, _: Duration) -> AppResult<()> {
            Ok(())
        }
        async fn download(&self, _: &str, _: &str, _: Duration) -> AppResult<RemoteDownload> {
            Err(AppError::NotFound("unused in this test".into()))
        }
    }

    async fn registry_with(healthy: bool) -> (Arc<PeerRegistry>, mpsc::UnboundedReceiver<String>) {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let http: Arc<dyn PeerHttpClient> = Arc::new(FakeHttp { healthy: AtomicBool::new(healthy) });
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(PeerRegistry::new(catalog, http, Config::from_env(), tx));
        (registry, rx)
    }

    #[tokio::test]
    async fn register_triggers_reindex_signal() {
        let (registry, mut rx) = registry_with(true).await;
        registry.register("peer1", "localhost", 8001, None).await.unwrap();
        let signaled = rx.recv().await.unwrap();
        assert_eq!(signaled, "peer1");
    }

    #[tokio::test]
    async fn status_marks_offline_on_probe_failure() {
        let (registry, _rx) = registry_with(false).await;
        registry.register("peer1", "localhost", 8001, None).await.unwrap();
        let status = registry.status("peer1").await.unwrap();
        assert!(!status.is_online);
        assert_eq!(status.reconnect_state, "disconnected");
    }

    #[tokio::test]
    async fn repeated_probe_failures_reach_failed_state() {
        let (registry, _rx) = registry_with(false).await;
        registry.register("peer1", "localhost", 8001, None).await.unwrap();

        let first = registry.status("peer1").await.unwrap();
        assert_eq!(first.reconnect_state, "disconnected");
        assert_eq!(first.reconnect_attempts, 0);

        let mut last = first;
        for _ in 0..Config::from_env().reconnect_max_attempts {
            last = registry.status("peer1").await.unwrap();
        }
        assert_eq!(last.reconnect_state, "failed");
        assert_eq!(last.reconnect_attempts, Config::from_env().reconnect_max_attempts);
    }

    #[tokio::test]
    async fn unregister_unknown_peer_is_not_found() {
        let (registry, _rx) = registry_with(true).await;
        let err = registry.unregister("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
