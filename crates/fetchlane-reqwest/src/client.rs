//! Transport implementation using reqwest.

use std::sync::Arc;

use fetchlane_core::{RequestInit, Transport, TransportResponse};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::ReqwestTransportConfig;
use crate::error::Error;

/// Tracing target for transport operations.
pub const TRACING_TARGET: &str = "fetchlane_reqwest";

/// Inner transport that holds the HTTP client and configuration.
struct TransportInner {
    http: Client,
    config: ReqwestTransportConfig,
}

impl std::fmt::Debug for TransportInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportInner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reqwest-backed implementation of the fetchlane [`Transport`] contract.
///
/// # Examples
///
/// ```rust,ignore
/// use fetchlane_engine::{FetchOptions, Fetcher, Request};
/// use fetchlane_reqwest::{ReqwestTransport, ReqwestTransportConfig};
/// use url::Url;
///
/// let config = ReqwestTransportConfig::new()
///     .with_base_url(Url::parse("https://api.example.com")?);
/// let transport = ReqwestTransport::new(config)?;
///
/// let fetcher: Fetcher<(), Vec<Item>> = Fetcher::new(
///     Request::url("/items"),
///     FetchOptions::new().transport(transport.into_transport()),
/// )?;
/// ```
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    inner: Arc<TransportInner>,
}

impl ReqwestTransport {
    /// Creates a new transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ReqwestTransportConfig) -> fetchlane_core::Result<Self> {
        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = config.timeout.as_millis(),
            "Creating reqwest transport"
        );

        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|err| {
                fetchlane_core::Error::configuration()
                    .with_message("failed to build the HTTP client")
                    .with_source(err)
            })?;

        let inner = TransportInner { http, config };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Creates a new transport with default configuration.
    pub fn with_defaults() -> fetchlane_core::Result<Self> {
        Self::new(ReqwestTransportConfig::default())
    }

    /// Gets the transport configuration.
    pub fn config(&self) -> &ReqwestTransportConfig {
        &self.inner.config
    }

    /// Converts this transport into the trait object the engine options
    /// accept.
    pub fn into_transport(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }

    /// Resolves a request URL, joining relative ones against the configured
    /// base.
    fn resolve_url(&self, url: &str) -> fetchlane_core::Result<url::Url> {
        match url::Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner.config.base_url {
                Some(base_url) => base_url.join(url).map_err(|err| {
                    fetchlane_core::Error::configuration()
                        .with_message(format!("cannot resolve {url} against {base_url}"))
                        .with_source(err)
                }),
                None => Err(fetchlane_core::Error::configuration()
                    .with_message(format!("relative URL {url} requires a base_url"))),
            },
            Err(err) => Err(fetchlane_core::Error::configuration()
                .with_message(format!("invalid URL {url}"))
                .with_source(err)),
        }
    }

    fn method_for(init: &RequestInit) -> fetchlane_core::Result<Method> {
        match &init.method {
            None => Ok(Method::GET),
            Some(method) => Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|err| {
                fetchlane_core::Error::configuration()
                    .with_message(format!("invalid HTTP method {method}"))
                    .with_source(err)
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(
        &self,
        url: &str,
        init: &RequestInit,
    ) -> fetchlane_core::Result<TransportResponse> {
        let target = self.resolve_url(url)?;
        let method = Self::method_for(init)?;

        tracing::debug!(
            target: TRACING_TARGET,
            method = %method,
            url = %target,
            "Dispatching request"
        );

        let mut request = self.inner.http.request(method, target.clone());
        for (name, value) in &init.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &init.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Error::Reqwest)?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown Status");

        if !status.is_success() {
            tracing::debug!(
                target: TRACING_TARGET,
                url = %target,
                status = status.as_u16(),
                "Request settled with non-success status"
            );
            // The body is irrelevant for failures; the engine records the
            // status text.
            return Ok(TransportResponse::with_status(status.as_u16(), status_text));
        }

        let body = response.json::<Value>().await.map_err(Error::Reqwest)?;
        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status_text.to_owned(),
            body,
        })
    }
}
