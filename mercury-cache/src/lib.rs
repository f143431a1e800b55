//! Fleet cache for Mercury.
//!
//! Tracks the last known location of every vehicle seen on the live feed
//! and forgets each one a fixed time after its latest sighting.

mod cache;

pub use cache::{FleetCache, FleetConfig, FleetStats, IngestSummary};
