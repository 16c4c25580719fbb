//! InkShare relay server.
//!
//! Hosts the durable stroke log behind a small REST API and relays its change
//! feed and cursor presence to WebSocket clients.

pub mod config;
pub mod rest;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::get;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, ServerConfig};

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route(
            "/rooms/{room}/strokes",
            get(rest::load_all).post(rest::append).delete(rest::clear),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "InkShare Relay Server - REST at /rooms/{room}/strokes, WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
