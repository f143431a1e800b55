//! Wire and timing constants for the Mercury feed.
//!
//! The upstream tracker multiplexes JSON envelopes inside each captured
//! network body. Every envelope of interest carries pipe-delimited vehicle
//! records. These constants pin down that framing.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Delimiter between fields of one location record.
pub const RECORD_DELIMITER: char = '|';

/// Minimum number of fields in a location record.
///
/// `driver|busID|departureTime|route|direction|lat|lon|timestamp|auxInt|auxString`
pub const RECORD_FIELD_COUNT: usize = 10;

/// Field positions within a record (0-indexed).
pub mod field {
    /// Driver identifier.
    pub const DRIVER: usize = 0;
    /// Vehicle identifier, primary key of the fleet table.
    pub const BUS_ID: usize = 1;
    /// Scheduled departure time, carried as text.
    pub const DEPARTURE_TIME: usize = 2;
    /// Route number.
    pub const ROUTE: usize = 3;
    /// Direction of travel.
    pub const DIRECTION: usize = 4;
    /// Latitude (IEEE-754 double).
    pub const LATITUDE: usize = 5;
    /// Longitude (IEEE-754 double).
    pub const LONGITUDE: usize = 6;
    /// Observation timestamp (RFC 3339).
    pub const TIMESTAMP: usize = 7;
    /// Opaque integer, best-effort.
    pub const AUX_INT: usize = 8;
    /// Opaque string, carried verbatim.
    pub const AUX_TEXT: usize = 9;
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// ASCII record separator between sub-messages of one frame.
pub const FRAME_SEPARATOR: u8 = 0x1E;

/// Envelope type of a data-bearing invocation message.
pub const INVOCATION_MESSAGE_TYPE: i64 = 1;

/// Handshake sent once after negotiating a feed connection.
pub const HANDSHAKE_MESSAGE: &str = "{\"protocol\":\"json\",\"version\":1}\u{1e}";

// ═══════════════════════════════════════════════════════════════════════════════
// FLEET CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Time a vehicle stays tracked after its last sighting.
pub const TRACKING_TTL: Duration = Duration::from_secs(2 * 60);

// ═══════════════════════════════════════════════════════════════════════════════
// UPSTREAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Upstream live-tracking site.
pub const DEFAULT_FEED_URL: &str = "https://findmybus.im";

/// Content type of exchanges that carry feed frames.
pub const FEED_MIME_TYPE: &str = "application/octet-stream";

/// Capacity of the bounded exchange channel between tap and interceptor.
pub const EXCHANGE_CHANNEL_CAPACITY: usize = 256;
