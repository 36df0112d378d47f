//! Configuration for the reqwest transport.

use std::time::Duration;

use fetchlane_core::Error;
use url::Url;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent advertised by the transport.
pub const DEFAULT_USER_AGENT: &str = concat!("fetchlane/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`ReqwestTransport`](crate::ReqwestTransport).
#[derive(Debug, Clone)]
pub struct ReqwestTransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Base URL that relative request URLs resolve against.
    pub base_url: Option<Url>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            base_url: None,
        }
    }
}

impl ReqwestTransportConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the base URL for relative request URLs.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the timeout is zero, the user
    /// agent is empty, or the base URL cannot serve as a base.
    pub fn validate(&self) -> fetchlane_core::Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::configuration().with_message("timeout must be non-zero"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::configuration().with_message("user agent must not be empty"));
        }
        if let Some(base_url) = &self.base_url {
            if base_url.cannot_be_a_base() {
                return Err(Error::configuration()
                    .with_message(format!("base URL cannot be a base: {base_url}")));
            }
        }
        Ok(())
    }
}
