#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;

pub mod emptiness;
pub mod request;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

pub use error::{BoxedError, Error, ErrorKind, Result};
pub use request::{Handler, Invoker, Request, RequestDescriptor, RequestInit};
pub use state::{FetchData, FetchParams, RequestState, SerializedState};
pub use transport::{Transport, TransportResponse};

/// Tracing target for core operations.
pub const TRACING_TARGET: &str = "fetchlane_core";

/// Parallel key used when no key function is configured.
///
/// Non-parallel usage degenerates to exactly one slot stored under this key.
pub const DEFAULT_PARALLEL_KEY: &str = "default";
