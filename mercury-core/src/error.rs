//! Error types for Mercury.
//!
//! Decoding failures are localized: a [`DecodeError`] discards one record,
//! never its batch. Everything else flows through [`MercuryError`].

use thiserror::Error;

/// Result type alias using `MercuryError`.
pub type Result<T> = std::result::Result<T, MercuryError>;

/// Why a single pipe-delimited location record was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Too few fields.
    #[error("Invalid record format: expected at least {expected} fields, got {actual}")]
    Format { expected: usize, actual: usize },

    /// The vehicle identifier field is empty.
    #[error("Record has an empty bus id")]
    MissingBusId,

    /// Observation timestamp is not RFC 3339.
    #[error("Invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    /// Latitude is not a finite number.
    #[error("Invalid latitude '{0}'")]
    Latitude(String),

    /// Longitude is not a finite number.
    #[error("Invalid longitude '{0}'")]
    Longitude(String),
}

/// Main error type for all Mercury operations.
#[derive(Debug, Error)]
pub enum MercuryError {
    // ═══════════════════════════════════════════════════════════════════════════
    // DECODING ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A location record failed to decode.
    #[error("Record decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A sub-message is not a valid envelope.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The outer transport encoding of a body could not be undone.
    #[error("Invalid body encoding: {0}")]
    InvalidBodyEncoding(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // FRAME ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// No sub-message of a frame yielded a single location.
    #[error("No bus locations found in {sub_messages} sub-message(s) ({issues} rejected)")]
    NoLocations { sub_messages: usize, issues: usize },

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSPORT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The body of an observed exchange is no longer retrievable.
    #[error("Response body unavailable for request {0}")]
    BodyUnavailable(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // NETWORK ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Connection timeout.
    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    /// Upstream answered with an unexpected status.
    #[error("Upstream returned status {status}: {reason}")]
    UpstreamStatus { status: u16, reason: String },

    /// Connection negotiation with the upstream feed failed.
    #[error("Feed negotiation failed: {0}")]
    NegotiationFailed(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUP & VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Vehicle not currently tracked.
    #[error("Vehicle not tracked: {0}")]
    VehicleNotFound(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MercuryError {
    /// Returns true if this error is recoverable (can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MercuryError::HttpError(_)
                | MercuryError::ConnectionTimeout(_)
                | MercuryError::UpstreamStatus { .. }
                | MercuryError::NegotiationFailed(_)
        )
    }

    /// Returns true if this is a transient transport miss.
    ///
    /// Misses mean the upstream discarded an exchange before its body was
    /// read. They are dropped silently.
    pub fn is_transport_miss(&self) -> bool {
        matches!(self, MercuryError::BodyUnavailable(_))
    }
}
