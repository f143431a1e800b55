//! DTOs for API responses.

use chrono::{DateTime, Utc};
use serde::Serialize;

use mercury_core::types::{LocationRecord, RedactionPolicy};

/// One vehicle location as exposed over HTTP.
///
/// Redacted fields are omitted rather than sent blank.
#[derive(Debug, Serialize)]
pub struct LocationDto {
    /// Vehicle identifier
    pub bus_id: String,
    /// Scheduled departure time
    pub departure_time: String,
    /// Route number
    pub route_number: String,
    /// Direction of travel
    pub direction: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Observation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque integer field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_int: Option<i64>,
    /// Opaque string field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_text: Option<String>,
}

impl LocationDto {
    /// Builds the DTO, leaving out whatever `policy` redacts.
    pub fn new(record: LocationRecord, policy: &RedactionPolicy) -> Self {
        Self {
            driver: (!policy.driver).then_some(record.driver),
            timestamp: (!policy.timestamp).then_some(record.timestamp),
            aux_int: (!policy.aux).then_some(record.aux_int),
            aux_text: (!policy.aux).then_some(record.aux_text),
            bus_id: record.bus_id,
            departure_time: record.departure_time,
            route_number: record.route,
            direction: record.direction,
            latitude: record.latitude,
            longitude: record.longitude,
        }
    }
}

/// Response for the fleet snapshot.
#[derive(Debug, Serialize)]
pub struct LocationsResponse {
    /// HTTP status code, always 200
    pub code: u16,
    /// Number of vehicles
    pub count: usize,
    /// Current locations, in no particular order
    pub locations: Vec<LocationDto>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Vehicles currently tracked
    pub tracked_vehicles: usize,
}
