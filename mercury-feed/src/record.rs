//! Pipe-delimited location record decoding.
//!
//! Timestamp, latitude and longitude are mandatory: any of them failing
//! discards the record. The opaque integer field is best-effort and falls
//! back to 0.

use chrono::{DateTime, Utc};

use mercury_core::constants::{field, RECORD_DELIMITER, RECORD_FIELD_COUNT};
use mercury_core::error::DecodeError;
use mercury_core::types::LocationRecord;

/// Decodes one record of the form
/// `driver|busID|departureTime|route|direction|lat|lon|timestamp|auxInt|auxString`.
///
/// Fields are trimmed of surrounding whitespace. Fields past the tenth are
/// ignored.
pub fn decode_record(record: &str) -> Result<LocationRecord, DecodeError> {
    let parts: Vec<&str> = record.split(RECORD_DELIMITER).map(str::trim).collect();

    if parts.len() < RECORD_FIELD_COUNT {
        return Err(DecodeError::Format {
            expected: RECORD_FIELD_COUNT,
            actual: parts.len(),
        });
    }

    let bus_id = parts[field::BUS_ID];
    if bus_id.is_empty() {
        return Err(DecodeError::MissingBusId);
    }

    let raw_timestamp = parts[field::TIMESTAMP];
    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|e| DecodeError::Timestamp {
            value: raw_timestamp.to_string(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    let latitude = parse_coordinate(parts[field::LATITUDE]).ok_or_else(|| {
        DecodeError::Latitude(parts[field::LATITUDE].to_string())
    })?;
    let longitude = parse_coordinate(parts[field::LONGITUDE]).ok_or_else(|| {
        DecodeError::Longitude(parts[field::LONGITUDE].to_string())
    })?;

    let aux_int = parts[field::AUX_INT].parse::<i64>().unwrap_or_default();

    Ok(LocationRecord {
        driver: parts[field::DRIVER].to_string(),
        bus_id: bus_id.to_string(),
        departure_time: parts[field::DEPARTURE_TIME].to_string(),
        route: parts[field::ROUTE].to_string(),
        direction: parts[field::DIRECTION].to_string(),
        latitude,
        longitude,
        timestamp,
        aux_int,
        aux_text: parts[field::AUX_TEXT].to_string(),
    })
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
