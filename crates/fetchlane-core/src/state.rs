//! Request state as observed by callers and persisted by the cache.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, TRACING_TARGET};

/// Bounds required of call parameters.
///
/// Parameters are cloned into slot state, serialized into cache entries and
/// hydration keys, and restored when a cached entry seeds a new slot.
pub trait FetchParams: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> FetchParams for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Bounds required of response data.
///
/// Data is cloned into slot state and serialized for the cache, hydration
/// payloads and the emptiness test behind the `nothing` flag.
pub trait FetchData: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> FetchData for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The observable state of one request slot.
///
/// Invariant: while `loading` is true, `error` is `None`. `nothing` is only
/// meaningful once a successful response has been recorded.
#[derive(Debug, Clone)]
pub struct RequestState<P, R> {
    /// Whether a call is in flight and the loading indicator should show.
    pub loading: bool,
    /// Whether the recorded response was an empty sequence or falsy scalar.
    pub nothing: bool,
    /// The failure of the most recent settled call, if any.
    pub error: Option<Arc<Error>>,
    /// Data from the most recent successful call or mutation.
    pub data: Option<R>,
    /// Arguments of the most recent dispatched call.
    pub params: Option<P>,
}

impl<P, R> Default for RequestState<P, R> {
    fn default() -> Self {
        Self {
            loading: false,
            nothing: false,
            error: None,
            data: None,
            params: None,
        }
    }
}

/// Serde image of a [`RequestState`], as stored in cache entries.
///
/// `data` and `params` are kept as raw JSON so the cache does not need the
/// caller's type parameters; `error` degrades to its display string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedState {
    /// Whether the slot was loading when persisted.
    pub loading: bool,
    /// The persisted `nothing` flag.
    pub nothing: bool,
    /// Display form of the persisted error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Serialized response data (`null` when absent).
    #[serde(default)]
    pub data: Value,
    /// Serialized call parameters (`null` when absent).
    #[serde(default)]
    pub params: Value,
}

impl<P, R> RequestState<P, R>
where
    P: FetchParams,
    R: FetchData,
{
    /// Serializes this state for persistence.
    ///
    /// Returns `None` when data or params refuse to serialize; the caller
    /// skips the cache write in that case.
    pub fn serialize(&self) -> Option<SerializedState> {
        let data = match &self.data {
            Some(data) => match serde_json::to_value(data) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Slot data is not serializable, skipping persistence"
                    );
                    return None;
                }
            },
            None => Value::Null,
        };
        let params = match &self.params {
            Some(params) => match serde_json::to_value(params) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Slot params are not serializable, skipping persistence"
                    );
                    return None;
                }
            },
            None => Value::Null,
        };

        Some(SerializedState {
            loading: self.loading,
            nothing: self.nothing,
            error: self.error.as_ref().map(|e| e.to_string()),
            data,
            params,
        })
    }

    /// Restores a state from its persisted image.
    ///
    /// Values that no longer deserialize into the caller's types are dropped
    /// rather than failing the whole restore; a persisted error string comes
    /// back as an [`crate::ErrorKind::Unknown`] error.
    pub fn deserialize(serialized: &SerializedState) -> Self {
        let data = match &serialized.data {
            Value::Null => None,
            value => serde_json::from_value(value.clone())
                .map_err(|err| {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Persisted data no longer deserializes, dropping it"
                    );
                })
                .ok(),
        };
        let params = match &serialized.params {
            Value::Null => None,
            value => serde_json::from_value(value.clone())
                .map_err(|err| {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Persisted params no longer deserialize, dropping them"
                    );
                })
                .ok(),
        };

        Self {
            loading: serialized.loading,
            nothing: serialized.nothing,
            error: serialized
                .error
                .as_ref()
                .map(|message| Arc::new(Error::unknown().with_message(message))),
            data,
            params,
        }
    }
}
