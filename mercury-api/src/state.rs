//! App state: fleet cache, config.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use mercury_cache::FleetCache;
use mercury_core::types::RedactionPolicy;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Fields blanked before locations are returned
    pub redaction: RedactionPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            redaction: RedactionPolicy::all(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let redaction = match std::env::var("REDACT_FIELDS") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(value = %raw, error = %e, "Invalid REDACT_FIELDS, redacting all");
                RedactionPolicy::all()
            }),
            Err(_) => RedactionPolicy::all(),
        };

        Self { redaction }
    }
}

pub struct AppState {
    pub config: ApiConfig,
    pub cache: Arc<FleetCache>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, cache: Arc<FleetCache>) -> Self {
        Self {
            config,
            cache,
            started_at: Instant::now(),
        }
    }
}
