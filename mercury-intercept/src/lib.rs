//! # Mercury Intercept
//!
//! Connects the upstream live-tracking page to the fleet cache.
//!
//! - [`FeedInterceptor`]: Consumes exchanges from any [`PageTap`], filters
//!   feed traffic, fetches bodies and ingests decoded frames
//! - [`LongPollTap`]: A page tap speaking the feed's long-polling transport
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mercury_cache::FleetCache;
//! use mercury_intercept::{FeedInterceptor, LongPollTap};
//!
//! let cache = Arc::new(FleetCache::new());
//! let tap = Arc::new(LongPollTap::new()?);
//! let interceptor = FeedInterceptor::new(tap, cache.clone());
//! interceptor.run(&"https://findmybus.im".parse()?, cancel).await?;
//! ```
//!
//! [`PageTap`]: mercury_core::traits::PageTap

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

mod body_store;
mod interceptor;
mod long_poll;

pub use body_store::BodyStore;
pub use interceptor::{decode_body, ingest_frame, FeedInterceptor, InterceptorConfig, InterceptorStats};
pub use long_poll::{LongPollConfig, LongPollTap};
