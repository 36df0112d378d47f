#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod options;
mod slot;
mod store;

pub use options::{
    AfterHook, BeforeHook, DelayPolicy, DepRefreshPolicy, ErrorHook, FetchOptions, ParallelKeyFn,
    ResultTransform, SuccessHook,
};
pub use store::Fetcher;

// Re-export the shared surface so most callers only depend on this crate.
pub use fetchlane_cache::{SlidingCache, DEFAULT_CACHE_TIME};
pub use fetchlane_core::{
    Error, ErrorKind, Request, RequestDescriptor, RequestInit, RequestState, Result, Transport,
    TransportResponse, DEFAULT_PARALLEL_KEY,
};

/// Tracing target for engine operations.
pub const TRACING_TARGET: &str = "fetchlane_engine";
