#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;

pub use crate::client::{ReqwestTransport, TRACING_TARGET};
pub use crate::config::{ReqwestTransportConfig, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use crate::error::{Error, Result};
