//! Common error type definitions.

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
///
/// Used as the source slot in [`Error`], wrapping any error that implements
/// the standard `Error` trait while keeping Send and Sync bounds.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur in fetchlane operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request descriptor. The only error surfaced synchronously,
    /// at construction time; it never reaches slot state.
    UnsupportedRequest,
    /// Non-success HTTP status from the transport.
    Http,
    /// Failure raised inside the request handler or the result transform.
    Handler,
    /// Transport-level failure (connect, timeout, protocol).
    Network,
    /// Body or payload (de)serialization failed.
    Serialization,
    /// Invalid configuration.
    Configuration,
    /// Sentinel for failures that carry no information of their own, so the
    /// recorded error is still meaningful.
    Unknown,
}

/// A structured error type for fetchlane operations.
///
/// Everything except [`ErrorKind::UnsupportedRequest`] is captured into slot
/// state rather than returned to the caller; see the engine crate for the
/// propagation rules.
#[derive(Debug, Error)]
#[error("{kind:?}{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// HTTP status code, present on [`ErrorKind::Http`] errors.
    pub status: Option<u16>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            status: None,
            source: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a new unsupported request error.
    pub fn unsupported_request() -> Self {
        Self::new(ErrorKind::UnsupportedRequest)
    }

    /// Creates a new HTTP error carrying the status code and status text.
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Http).with_message(status_text);
        err.status = Some(status);
        err
    }

    /// Creates a new handler error.
    pub fn handler() -> Self {
        Self::new(ErrorKind::Handler)
    }

    /// Creates a new network error.
    pub fn network() -> Self {
        Self::new(ErrorKind::Network)
    }

    /// Creates a new serialization error.
    pub fn serialization() -> Self {
        Self::new(ErrorKind::Serialization)
    }

    /// Creates a new configuration error.
    pub fn configuration() -> Self {
        Self::new(ErrorKind::Configuration)
    }

    /// Creates a new unknown error.
    pub fn unknown() -> Self {
        Self::new(ErrorKind::Unknown)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.into()
    }

    /// Returns the HTTP status code, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization()
            .with_message(err.to_string())
            .with_source(err)
    }
}
