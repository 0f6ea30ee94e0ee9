//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ledger::LedgerEngine;
use crate::metrics::RequestMetrics;

pub use routes::create_router;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: LedgerEngine,
    pub metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(engine: LedgerEngine) -> Self {
        Self {
            engine,
            metrics: Arc::new(RequestMetrics::new()),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let api_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.metrics.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
