//! # Mercury Core
//!
//! Core types, errors, and traits for the Mercury live bus-location pipeline.
//!
//! This crate provides the foundational building blocks used by all other Mercury crates:
//!
//! - **Types**: Location records, feed envelopes, observed exchanges
//! - **Errors**: Decode errors localized to one record, plus the pipeline error
//! - **Constants**: Wire framing and cache timing
//! - **Traits**: The page tap the interceptor consumes
//!
//! ## Example
//!
//! ```rust
//! use mercury_core::{Envelope, FRAME_SEPARATOR};
//!
//! let env: Envelope = serde_json::from_str(r#"{"type":6}"#).unwrap();
//! assert!(!env.is_invocation());
//! assert_eq!(FRAME_SEPARATOR, 0x1E);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{DecodeError, MercuryError, Result};
pub use traits::*;
pub use types::*;
