//! API route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use mercury_cache::FleetStats;
use mercury_core::error::MercuryError;

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

/// GET /api/v1/locations
pub async fn get_locations(State(state): State<Arc<AppState>>) -> Json<LocationsResponse> {
    let policy = state.config.redaction;
    let locations: Vec<LocationDto> = state
        .cache
        .snapshot_redacted(&policy)
        .into_iter()
        .map(|record| LocationDto::new(record, &policy))
        .collect();

    debug!(count = locations.len(), "Serving bus locations");

    Json(LocationsResponse {
        code: StatusCode::OK.as_u16(),
        count: locations.len(),
        locations,
    })
}

/// GET /api/v1/locations/:bus_id
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(bus_id): Path<String>,
) -> Result<Json<LocationDto>> {
    if bus_id.trim().is_empty() {
        return Err(MercuryError::ValidationError("bus id is empty".into()).into());
    }

    let policy = state.config.redaction;
    let record = state
        .cache
        .get(&bus_id)
        .ok_or_else(|| MercuryError::VehicleNotFound(bus_id.clone()))?;

    Ok(Json(LocationDto::new(record.redacted(&policy), &policy)))
}

/// GET /api/v1/locations/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<FleetStats> {
    Json(state.cache.stats())
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        tracked_vehicles: state.cache.len(),
    })
}
