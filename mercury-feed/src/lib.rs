//! # Mercury Feed
//!
//! Decoding of the upstream live-location wire format.
//!
//! - [`decode_record`]: One pipe-delimited location record
//! - [`parse_message`]: One JSON envelope and the records it carries
//! - [`parse_frame`]: A whole captured body of `0x1E`-separated envelopes
//!
//! ## Example
//!
//! ```rust
//! use mercury_feed::parse_frame;
//!
//! let frame = br#"{"type":1,"target":"updateLocations","arguments":[{"locations":["D|B1|08:00|5|In|54.15|-4.48|2026-01-11T03:55:00Z|1|x"]}]}"#;
//! let parsed = parse_frame(frame).unwrap();
//! assert_eq!(parsed.records[0].bus_id, "B1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod frame;
mod record;

pub use frame::{parse_frame, parse_message, FrameError, FrameIssue, IssueKind, MessageRecords, ParsedFrame};
pub use record::decode_record;
