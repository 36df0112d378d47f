//! Internal error types for fetchlane-reqwest.

use thiserror::Error;

/// Result type alias for fetchlane-reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type for fetchlane-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<Error> for fetchlane_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    fetchlane_core::Error::network()
                        .with_message("Request timed out")
                        .with_source(e)
                } else if e.is_connect() {
                    fetchlane_core::Error::network()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_decode() {
                    fetchlane_core::Error::serialization()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    fetchlane_core::Error::network()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => fetchlane_core::Error::serialization()
                .with_message(e.to_string())
                .with_source(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_maps_to_serialization_kind() {
        let inner = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: fetchlane_core::Error = Error::Serde(inner).into();
        assert_eq!(err.kind(), fetchlane_core::ErrorKind::Serialization);
        assert!(err.source.is_some());
    }
}
