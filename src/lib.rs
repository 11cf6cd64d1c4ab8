//! Reelcollab server - collaboration requests and payment agreements between filmmakers

pub mod changes;
pub mod collaboration;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod store;
pub mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::changes::ChangeFeed;
use crate::collaboration::CollaborationService;
use crate::retry::RetryPolicy;
use crate::store::SqliteStore;

/// Application state shared across handlers
pub struct AppState {
    pub service: CollaborationService,
    pub store: SqliteStore,
}

impl AppState {
    pub fn new(store: SqliteStore, feed: ChangeFeed, retry: RetryPolicy) -> Arc<Self> {
        let shared = Arc::new(store.clone());
        Arc::new(Self {
            service: CollaborationService::new(shared.clone(), shared, feed, retry),
            store,
        })
    }
}

/// HTTP routes: a health probe and the WebSocket endpoint
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
