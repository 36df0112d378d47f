//! Mock transport for testing.
//!
//! Scripts responses (and optional latency) for the [`Transport`] contract
//! and records every call so tests can assert on dispatched URLs and
//! options.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! fetchlane-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::request::RequestInit;
use crate::transport::{Transport, TransportResponse};
use crate::Result;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The URL the engine dispatched.
    pub url: String,
    /// The call options it forwarded.
    pub init: RequestInit,
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Result<TransportResponse>>,
    calls: Vec<RecordedCall>,
    latency: Option<Duration>,
}

/// A scripted transport that records calls.
///
/// Responses are consumed in FIFO order; once the script is exhausted every
/// further call answers `200 OK` with a `null` body.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this mock as a shareable transport object.
    pub fn clone_arc(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Queues a response.
    pub fn enqueue(&self, response: TransportResponse) {
        self.state.lock().unwrap().responses.push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn enqueue_error(&self, error: crate::Error) {
        self.state.lock().unwrap().responses.push_back(Err(error));
    }

    /// Delays every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Returns how many calls were recorded.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockTransport")
            .field("queued", &state.responses.len())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<TransportResponse> {
        let (latency, response) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                url: url.to_owned(),
                init: init.clone(),
            });
            (state.latency, state.responses.pop_front())
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        response.unwrap_or_else(|| Ok(TransportResponse::ok(Value::Null)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_responses_are_fifo() {
        let mock = MockTransport::new();
        mock.enqueue(TransportResponse::ok(json!(1)));
        mock.enqueue(TransportResponse::with_status(500, "Internal Server Error"));

        let first = mock.fetch("/a", &RequestInit::default()).await.unwrap();
        assert_eq!(first.body, json!(1));

        let second = mock.fetch("/b", &RequestInit::default()).await.unwrap();
        assert_eq!(second.status, 500);

        // Exhausted script falls back to an empty success.
        let third = mock.fetch("/c", &RequestInit::default()).await.unwrap();
        assert!(third.is_success());
        assert_eq!(mock.call_count(), 3);
    }
}
