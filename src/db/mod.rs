//! The Catalog Store (spec.md §4.2): durable storage for `Peer`, `File`,
//! `TransferLog`, behind a single `sqlx::SqlitePool`.
//!
//! The teacher crate has no embedded relational store of its own; this
//! module's shape (a cloneable handle wrapping a connection pool, short-lived
//! transactions per write) follows the sqlx usage in the wider pack
//! (`examples/other_examples/manifests/dog4ik-media-server`,
//! `ikatson-rqbit`) rather than any one teacher file.

pub mod files;
pub mod models;
pub mod peers;
pub mod stats;
pub mod transfers;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

#[derive(Clone)]
pub struct Catalog {
    pub(crate) pool: SqlitePool,
}

impl Catalog {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(%database_url, "catalog store connected and migrated");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

/// Conjunctive search filter over `{filename substring, file_hash exact,
/// size range, peer_id}`; only `is_available = true` rows match
/// (spec.md §4.2).
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchFilter {
    pub filename: Option<String>,
    pub file_hash: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub peer_id: Option<String>,
}
