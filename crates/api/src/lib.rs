//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - The delivery-channel push endpoint
//! - Liveness and readiness checks

pub mod routes;

use axum::Router;
use ledgerline_db::PostingService;
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Posting pipeline used by the push endpoint.
    pub posting: PostingService,
    /// Connection used by the readiness probe.
    pub db: DatabaseConnection,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
