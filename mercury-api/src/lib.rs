//! # Mercury API Server
//!
//! HTTP facade over the fleet cache. This is the only outside reader of
//! tracked locations.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness and tracked-vehicle count
//! - `GET /api/v1/locations` - Every currently tracked vehicle
//! - `GET /api/v1/locations/:bus_id` - One tracked vehicle
//! - `GET /api/v1/locations/stats` - Fleet cache statistics
//!
//! ## Example
//!
//! ```rust,ignore
//! use mercury_api::{ApiServer, ApiConfig};
//!
//! let server = ApiServer::new(ApiConfig::from_env(), cache);
//! server.run(([0, 0, 0, 0], 8090), shutdown).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod routes;
mod handlers;
mod state;
mod dto;
mod error;

pub use routes::create_router;
pub use state::{AppState, ApiConfig};
pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use mercury_cache::FleetCache;

/// API server for Mercury.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server reading from `cache`.
    pub fn new(config: ApiConfig, cache: Arc<FleetCache>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, cache)),
        }
    }

    /// Creates the router with all routes configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address until `shutdown` fires.
    pub async fn run(
        self,
        addr: impl Into<SocketAddr>,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(redaction = %self.state.config.redaction, "Mercury API server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
