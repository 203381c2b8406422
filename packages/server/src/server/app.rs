//! Application setup and router configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::chat::WorkflowEngine;
use crate::domains::ingest::EnrichmentConfig;
use crate::kernel::ServerDeps;
use crate::server::routes::{health_handler, message_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub deps: ServerDeps,
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps, enrichment: EnrichmentConfig) -> Router {
    let state = AppState {
        engine: Arc::new(WorkflowEngine::new(deps.clone(), enrichment)),
        deps,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/chat/message", post(message_handler))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
