//! Common traits for Mercury.
//!
//! The upstream feed is only reachable through something that watches a
//! live page's network traffic. These traits describe that capability
//! without tying the pipeline to a particular automation backend.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::types::{Exchange, ResponseBody};

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE TAP TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Interface to a page network tap.
///
/// Implementations might use:
/// - A long-polling HTTP client against the feed endpoint
/// - A browser driven over a devtools protocol
/// - Canned exchanges (for testing)
#[async_trait]
pub trait PageTap: Send + Sync {
    /// Opens `url` and publishes every completed exchange on `tx`.
    ///
    /// Returns once `cancel` fires, `tx` is closed, or the tap fails
    /// unrecoverably.
    async fn open(
        &self,
        url: &Url,
        tx: mpsc::Sender<Exchange>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Retrieves the body of a previously published exchange.
    ///
    /// Fails with `BodyUnavailable` when the upstream has already discarded it.
    async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody>;

    /// Releases the page and any buffered bodies.
    async fn close(&self);
}
