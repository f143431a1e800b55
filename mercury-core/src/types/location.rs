//! Vehicle location records and the redaction applied when exposing them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MercuryError;

/// One vehicle sighting decoded from the live feed.
///
/// # Wire Format
/// ```text
/// driver|busID|departureTime|route|direction|lat|lon|timestamp|auxInt|auxString
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Driver identifier
    pub driver: String,
    /// Vehicle identifier (primary key, never empty)
    pub bus_id: String,
    /// Scheduled departure time, as published
    pub departure_time: String,
    /// Route number
    pub route: String,
    /// Direction of travel
    pub direction: String,
    /// Latitude in degrees (finite)
    pub latitude: f64,
    /// Longitude in degrees (finite)
    pub longitude: f64,
    /// When the upstream observed the vehicle
    pub timestamp: DateTime<Utc>,
    /// Opaque integer field, 0 when unparseable
    pub aux_int: i64,
    /// Opaque string field
    pub aux_text: String,
}

impl LocationRecord {
    /// Returns a copy with the fields selected by `policy` blanked.
    pub fn redacted(&self, policy: &RedactionPolicy) -> Self {
        let mut record = self.clone();
        policy.apply(&mut record);
        record
    }
}

/// Which fields are blanked before a snapshot leaves the process.
///
/// The driver identifier, observation timestamp and the two opaque fields
/// have been hidden from callers in some deployments and exposed in others,
/// so the choice is made per deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionPolicy {
    /// Blank the driver identifier
    pub driver: bool,
    /// Reset the observation timestamp to the Unix epoch
    pub timestamp: bool,
    /// Zero both opaque fields
    pub aux: bool,
}

impl RedactionPolicy {
    /// Exposes every field.
    pub const fn none() -> Self {
        Self {
            driver: false,
            timestamp: false,
            aux: false,
        }
    }

    /// Blanks driver, timestamp and both opaque fields.
    pub const fn all() -> Self {
        Self {
            driver: true,
            timestamp: true,
            aux: true,
        }
    }

    /// Returns true if no field is redacted.
    pub fn is_none(&self) -> bool {
        !(self.driver || self.timestamp || self.aux)
    }

    /// Blanks the selected fields of `record` in place.
    pub fn apply(&self, record: &mut LocationRecord) {
        if self.driver {
            record.driver.clear();
        }
        if self.timestamp {
            record.timestamp = DateTime::<Utc>::default();
        }
        if self.aux {
            record.aux_int = 0;
            record.aux_text.clear();
        }
    }
}

impl FromStr for RedactionPolicy {
    type Err = MercuryError;

    /// Parses a comma list of `driver`, `timestamp`, `aux`, or `all` / `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policy = RedactionPolicy::none();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item.to_ascii_lowercase().as_str() {
                "none" => {}
                "all" => policy = RedactionPolicy::all(),
                "driver" => policy.driver = true,
                "timestamp" => policy.timestamp = true,
                "aux" => policy.aux = true,
                other => {
                    return Err(MercuryError::ConfigError(format!(
                        "unknown redaction field '{}'",
                        other
                    )))
                }
            }
        }
        Ok(policy)
    }
}

impl fmt::Display for RedactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        let fields: Vec<&str> = [
            (self.driver, "driver"),
            (self.timestamp, "timestamp"),
            (self.aux, "aux"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        f.write_str(&fields.join(","))
    }
}
