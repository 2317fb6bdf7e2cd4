//! Coordinator entry point: parse CLI overrides, build the typed [`Config`],
//! wire the dependency-injected [`AppState`], and serve the REST API until
//! SIGINT/SIGTERM (mirrors `headless.rs`'s clap + tracing_subscriber +
//! `tokio::signal` startup sequence).

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use overlay_coordinator::api;
use overlay_coordinator::config::Config;
use overlay_coordinator::httpclient::{PeerHttpClient, ReqwestPeerClient};
use overlay_coordinator::state::AppState;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "overlay-coordinator")]
#[command(about = "Centralized coordinator for a peer-to-peer file-sharing overlay", long_about = None)]
struct CliArgs {
    /// Override CENTRAL_SERVER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Override CENTRAL_SERVER_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }

    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::new(format!(
            "overlay_coordinator={level},tower_http=info",
            level = config.log_level
        )))
        .try_init();

    info!(?config, "starting overlay coordinator");

    let http: Arc<dyn PeerHttpClient> = Arc::new(ReqwestPeerClient::new());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let (state, shutdown_tx) = AppState::build(config, http).await?;

    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, api::into_make_service(router))
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received, draining background loops");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("coordinator stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
