//! Frame parsing.
//!
//! A frame is one captured network body. It holds any number of JSON
//! envelopes separated by `0x1E`. Failures stay local: a bad record drops
//! that record, a bad envelope drops that sub-message, and the frame as a
//! whole only fails when nothing in it produced a location.

use thiserror::Error;
use tracing::{debug, warn};

use mercury_core::constants::FRAME_SEPARATOR;
use mercury_core::error::{MercuryError, Result};
use mercury_core::types::{Envelope, LocationRecord};

use crate::record::decode_record;

/// Locations decoded from one envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageRecords {
    /// Records that decoded cleanly
    pub records: Vec<LocationRecord>,
    /// Records that were dropped
    pub dropped: usize,
}

/// Why a sub-message contributed nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueKind {
    /// Bytes are not UTF-8.
    NotUtf8,
    /// Text is not a valid envelope.
    InvalidEnvelope(String),
}

/// A sub-message that was skipped, by position within its frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameIssue {
    /// Index of the sub-message (empty ones included)
    pub index: usize,
    /// What went wrong
    pub kind: IssueKind,
}

/// Result of parsing a frame that yielded at least one location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedFrame {
    /// All decoded locations, in frame order
    pub records: Vec<LocationRecord>,
    /// Non-empty sub-messages seen
    pub sub_messages: usize,
    /// Records dropped by the decoder
    pub dropped_records: usize,
    /// Sub-messages skipped entirely
    pub issues: Vec<FrameIssue>,
}

/// A frame with no usable location data.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Every sub-message was empty, a non-invocation, or rejected.
    #[error("no bus locations found in any of {sub_messages} sub-message(s)")]
    NoLocations {
        /// Non-empty sub-messages seen
        sub_messages: usize,
        /// Sub-messages skipped entirely
        issues: Vec<FrameIssue>,
    },
}

impl FrameError {
    /// Returns true if at least one sub-message was rejected.
    ///
    /// A frame of pings alone is an empty tick, not corruption.
    pub fn is_corrupt(&self) -> bool {
        match self {
            FrameError::NoLocations { issues, .. } => !issues.is_empty(),
        }
    }
}

impl From<FrameError> for MercuryError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::NoLocations {
                sub_messages,
                issues,
            } => MercuryError::NoLocations {
                sub_messages,
                issues: issues.len(),
            },
        }
    }
}

/// Decodes one envelope and the location records it carries.
///
/// Non-invocation envelopes yield no records. Records that fail to decode
/// are dropped and counted.
pub fn parse_message(message: &str) -> Result<MessageRecords> {
    let envelope: Envelope = serde_json::from_str(message)
        .map_err(|e| MercuryError::InvalidEnvelope(e.to_string()))?;

    let raw = envelope.raw_locations();
    let mut out = MessageRecords {
        records: Vec::with_capacity(raw.len()),
        dropped: 0,
    };

    for line in raw {
        match decode_record(line) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                warn!(record = %line, error = %e, "Dropping undecodable location");
                out.dropped += 1;
            }
        }
    }

    Ok(out)
}

/// Splits a frame on `0x1E` and decodes every sub-message independently.
pub fn parse_frame(frame: &[u8]) -> std::result::Result<ParsedFrame, FrameError> {
    let mut parsed = ParsedFrame::default();

    for (index, part) in frame.split(|b| *b == FRAME_SEPARATOR).enumerate() {
        if part.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        parsed.sub_messages += 1;

        let text = match std::str::from_utf8(part) {
            Ok(text) => text.trim(),
            Err(_) => {
                debug!(index, "Skipping sub-message that is not UTF-8");
                parsed.issues.push(FrameIssue {
                    index,
                    kind: IssueKind::NotUtf8,
                });
                continue;
            }
        };

        match parse_message(text) {
            Ok(batch) => {
                parsed.dropped_records += batch.dropped;
                parsed.records.extend(batch.records);
            }
            Err(e) => {
                debug!(index, error = %e, message = %text, "Skipping sub-message");
                parsed.issues.push(FrameIssue {
                    index,
                    kind: IssueKind::InvalidEnvelope(e.to_string()),
                });
            }
        }
    }

    if parsed.records.is_empty() {
        return Err(FrameError::NoLocations {
            sub_messages: parsed.sub_messages,
            issues: parsed.issues,
        });
    }

    Ok(parsed)
}
