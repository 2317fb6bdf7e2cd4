//! Coordinator library crate: the four core subsystems (Peer Registry,
//! File Catalog/Indexer, Transfer Manager, Download Proxy) behind one
//! dependency-injected [`state::AppState`] and a REST [`api::router`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod httpclient;
pub mod indexer;
pub mod proxy;
pub mod ratelimit;
pub mod registry;
pub mod state;
pub mod transfer;
pub mod validation;
