//! REST surface (spec.md §6): one `axum::Router` wiring every `/api/*`
//! route onto the shared [`AppState`], behind CORS, request tracing, and
//! the sliding-window rate limiter.

pub mod download;
pub mod files;
pub mod health;
pub mod peers;
pub mod transfers;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ratelimit::{RateLimitConfig, RateLimitLayer, RateLimiterState};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let rate_limiter = RateLimiterState::new(RateLimitConfig {
        max_requests: state.config.rate_limit_max_requests,
        window: state.config.rate_limit_window,
    });

    Router::new()
        .route("/api/peers/register", post(peers::register))
        .route("/api/peers/{peer_id}", axum::routing::delete(peers::unregister))
        .route("/api/peers", get(peers::list_all))
        .route("/api/peers/online", get(peers::list_online))
        .route("/api/peers/{peer_id}/status", get(peers::status))
        .route("/api/files/index/{peer_id}", post(files::index_peer))
        .route("/api/files/index-all", post(files::index_all))
        .route("/api/files/search", post(files::search))
        .route("/api/files/peer/{peer_id}", get(files::peer_files))
        .route("/api/transfers/download", post(transfers::initiate_download))
        .route("/api/transfers/upload-file", post(transfers::upload_file))
        .route("/api/transfers/{id}/status", get(transfers::status))
        .route("/api/transfers/active", get(transfers::active))
        .route("/api/transfers/history", get(transfers::history))
        .route("/api/download/{file_hash}", get(download::download))
        .route("/api/health", get(health::health))
        .route("/api/stats", get(health::stats))
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn into_make_service(
    router: Router,
) -> axum::extract::connect_info::IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    router.into_make_service_with_connect_info::<SocketAddr>()
}
