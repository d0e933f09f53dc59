use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::config::SharedConfig;
use crate::persistence::{EventLog, TradeLedger};
use crate::status::StatusBoard;

/// Application state shared across handlers
pub struct AppState {
    pub board: StatusBoard,
    pub config: SharedConfig,
    pub ledger: Arc<dyn TradeLedger>,
    pub events: Arc<dyn EventLog>,
    pub force_close: Arc<AtomicBool>,
    /// When set, every route requires `Authorization: Bearer <password>`
    pub password: Option<String>,
}

/// Create the status API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/trades", get(handlers::trades))
        .route("/logs", get(handlers::logs))
        .route("/force-close", post(handlers::force_close))
        .route("/config", post(handlers::update_config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_password,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the process exits.
pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind status API to {}", bind))?;

    info!("🌐 [API] Status API listening on {}", bind);
    axum::serve(listener, create_router(state))
        .await
        .context("Status API server failed")
}
