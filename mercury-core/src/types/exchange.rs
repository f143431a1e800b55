//! What a page tap reports about the network traffic it observes.

use serde::{Deserialize, Serialize};

/// One completed HTTP exchange observed on the tapped page.
///
/// Carries only metadata; the body is fetched separately by request id and
/// may already be gone by then.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Tap-assigned request identifier
    pub request_id: String,
    /// URL of the response
    pub url: String,
    /// Response content type as reported upstream
    pub mime_type: String,
}

impl Exchange {
    /// Creates a new exchange record.
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns true if the content type contains `mime_type`, ignoring case.
    pub fn matches_mime(&self, mime_type: &str) -> bool {
        self.mime_type
            .to_ascii_lowercase()
            .contains(&mime_type.to_ascii_lowercase())
    }
}

/// Body of an exchange as handed back by the tap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Body text, base64 when `base64_encoded` is set
    pub body: String,
    /// Whether `body` carries base64 rather than raw text
    pub base64_encoded: bool,
}

impl ResponseBody {
    /// A body delivered as plain text.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            base64_encoded: false,
        }
    }

    /// A body delivered base64-encoded.
    pub fn base64(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            base64_encoded: true,
        }
    }
}
