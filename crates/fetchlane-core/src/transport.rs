//! The fetch-shaped transport contract consumed by URL-style requests.

use serde_json::Value;

use crate::request::RequestInit;
use crate::Result;

/// Tracing target for transport operations.
pub const TRACING_TARGET: &str = "fetchlane_core::transport";

/// A single HTTP exchange as seen by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status text matching the code (`"Not Found"` for 404).
    pub status_text: String,
    /// Decoded JSON body; `Value::Null` when the transport skipped decoding.
    pub body: Value,
}

impl TransportResponse {
    /// Creates a successful (200) response around a body.
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_owned(),
            body,
        }
    }

    /// Creates a response with an explicit status and status text.
    pub fn with_status(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: Value::Null,
        }
    }

    /// Whether the status is in the success range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Core trait for dispatching HTTP exchanges.
///
/// Implement this to plug a concrete HTTP client under the engine; the
/// reqwest-backed implementation lives in `fetchlane-reqwest`. Errors
/// returned here are captured into slot state, never surfaced to the caller
/// of `load`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Performs one exchange against `url` with the given call options.
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::ok(Value::Null).is_success());
        assert!(TransportResponse::with_status(204, "No Content").is_success());
        assert!(!TransportResponse::with_status(301, "Moved Permanently").is_success());
        assert!(!TransportResponse::with_status(500, "Internal Server Error").is_success());
    }
}
