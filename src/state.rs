//! Explicit dependency-injection container wiring the four core
//! subsystems together (spec.md §9 REDESIGN FLAGS: no module-level global
//! singletons — a constructed struct passed through `axum::State` instead).

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::db::Catalog;
use crate::httpclient::PeerHttpClient;
use crate::indexer::FileIndexer;
use crate::proxy::DownloadProxy;
use crate::registry::PeerRegistry;
use crate::transfer::TransferManager;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub registry: Arc<PeerRegistry>,
    pub indexer: Arc<FileIndexer>,
    pub transfers: Arc<TransferManager>,
    pub proxy: Arc<DownloadProxy>,
    pub config: Config,
}

impl AppState {
    pub async fn build(
        config: Config,
        http: Arc<dyn PeerHttpClient>,
    ) -> anyhow::Result<(Self, watch::Sender<bool>)> {
        let catalog = Catalog::connect(&config.database_url).await?;

        let (reindex_tx, reindex_rx) = mpsc::unbounded_channel::<String>();
        let registry = Arc::new(PeerRegistry::new(
            catalog.clone(),
            http.clone(),
            config.clone(),
            reindex_tx,
        ));
        let indexer = Arc::new(FileIndexer::new(catalog.clone(), http.clone(), config.clone()));
        let transfers = Arc::new(TransferManager::new(
            catalog.clone(),
            registry.clone(),
            indexer.clone(),
            http.clone(),
            config.clone(),
        ));
        let proxy = Arc::new(DownloadProxy::new(
            catalog.clone(),
            registry.clone(),
            http,
            config.clone(),
        ));

        let indexer_for_loop = indexer.clone();
        tokio::spawn(indexer_for_loop.run_reindex_loop(reindex_rx));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        registry.clone().spawn_probe_loop(config.health_probe_timeout * 3, shutdown_rx);

        Ok((
            Self {
                catalog,
                registry,
                indexer,
                transfers,
                proxy,
                config,
            },
            shutdown_tx,
        ))
    }
}
