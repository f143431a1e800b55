//! API route configuration.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Live locations
        .route("/api/v1/locations", get(handlers::get_locations))
        .route("/api/v1/locations/stats", get(handlers::get_stats))
        .route("/api/v1/locations/:bus_id", get(handlers::get_location))

        .with_state(state)
}
