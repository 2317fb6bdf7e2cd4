//! Typed configuration, loaded once at startup from environment variables.
//!
//! Replaces the dynamic configuration object called out in `spec.md` §9
//! ("Dynamic configuration object... Replace with a typed config record with
//! enumerated fields") the same way `headless.rs`'s `CliArgs` enumerates
//! every flag explicitly rather than reading an untyped map.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    /// `PEER_HOST_OVERRIDES=peer_id=host,peer_id2=host2`. See SPEC_FULL.md §B.3.
    pub peer_host_overrides: HashMap<String, String>,

    pub health_probe_timeout: Duration,
    pub indexer_fetch_timeout: Duration,
    pub upload_attempt_timeout: Duration,
    pub download_connect_timeout: Duration,
    pub reconnect_base_interval: Duration,
    pub reconnect_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://overlay_coordinator.db".to_string()),
            host: std::env::var("CENTRAL_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("CENTRAL_SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            rate_limit_window: Duration::from_secs(
                std::env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            peer_host_overrides: parse_host_overrides(
                std::env::var("PEER_HOST_OVERRIDES").unwrap_or_default(),
            ),
            health_probe_timeout: Duration::from_secs(10),
            indexer_fetch_timeout: Duration::from_secs(30),
            upload_attempt_timeout: Duration::from_secs(60),
            download_connect_timeout: Duration::from_secs(30),
            reconnect_base_interval: Duration::from_secs(30),
            reconnect_max_attempts: 5,
        }
    }

    /// Resolve a peer's advertised host through the deployment override
    /// table, falling back to the host the peer registered with.
    pub fn resolve_host<'a>(&'a self, peer_id: &str, registered_host: &'a str) -> &'a str {
        self.peer_host_overrides
            .get(peer_id)
            .map(String::as_str)
            .unwrap_or(registered_host)
    }

    pub fn peer_base_url(&self, peer_id: &str, registered_host: &str, port: i64) -> String {
        let host = self.resolve_host(peer_id, registered_host);
        format!("http://{host}:{port}")
    }
}

fn parse_host_overrides(raw: String) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (id, host) = pair.split_once('=')?;
            let id = id.trim();
            let host = host.trim();
            if id.is_empty() || host.is_empty() {
                return None;
            }
            Some((id.to_string(), host.to_string()))
        })
        .collect()
}
