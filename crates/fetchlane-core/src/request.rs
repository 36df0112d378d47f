//! Request descriptors and their resolved invoker.
//!
//! A request is described once, as a callable, a URL string or a
//! url-plus-options descriptor, and resolved into an [`Invoker`] at
//! construction time. Malformed descriptors fail right there with
//! [`ErrorKind::UnsupportedRequest`]; per-call dispatch never re-probes the
//! descriptor shape.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{FetchData, FetchParams};
use crate::transport::{Transport, TRACING_TARGET};
use crate::{Error, Result};

/// An async request handler taking the call arguments.
pub type Handler<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Call options forwarded to the transport alongside the URL.
///
/// An absent method means GET.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInit {
    /// HTTP method; GET when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Header name/value pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestInit {
    /// Sets the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A URL plus call options, the object form of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    /// Target URL.
    pub url: String,
    /// Everything that is not the URL, passed through to the transport.
    pub init: RequestInit,
}

impl RequestDescriptor {
    /// Creates a descriptor for a URL with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            init: RequestInit::default(),
        }
    }

    /// Replaces the call options.
    pub fn with_init(mut self, init: RequestInit) -> Self {
        self.init = init;
        self
    }
}

/// How a request is performed: a caller-supplied async function, a bare URL
/// fetched with GET, or a URL-plus-options descriptor.
pub enum Request<P, R> {
    /// Invoke the function with the call arguments.
    Handler(Handler<P, R>),
    /// GET the URL through the configured transport.
    Url(String),
    /// Fetch `descriptor.url` with `descriptor.init` as call options.
    Descriptor(RequestDescriptor),
}

impl<P, R> Request<P, R> {
    /// Wraps an async function as a request.
    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::Handler(Arc::new(move |params| Box::pin(f(params))))
    }

    /// Wraps a URL string as a GET request.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Wraps a url-plus-options descriptor.
    pub fn descriptor(descriptor: RequestDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl<P, R> std::fmt::Debug for Request<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => f.debug_tuple("Handler").finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Descriptor(descriptor) => f.debug_tuple("Descriptor").field(descriptor).finish(),
        }
    }
}

enum InvokerKind<P, R> {
    Handler(Handler<P, R>),
    Http {
        url: String,
        init: RequestInit,
        transport: Arc<dyn Transport>,
    },
}

/// A [`Request`] resolved against its transport, ready to dispatch.
pub struct Invoker<P, R> {
    kind: InvokerKind<P, R>,
}

impl<P, R> Invoker<P, R>
where
    P: FetchParams,
    R: FetchData,
{
    /// Resolves a request descriptor once.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnsupportedRequest`](crate::ErrorKind) error
    /// when the URL is empty or a URL-style request has no transport to run
    /// on. This is the only synchronous failure in the whole call surface.
    pub fn resolve(request: Request<P, R>, transport: Option<Arc<dyn Transport>>) -> Result<Self> {
        let kind = match request {
            Request::Handler(handler) => InvokerKind::Handler(handler),
            Request::Url(url) => {
                Self::http_kind(url, RequestInit::default(), transport)?
            }
            Request::Descriptor(RequestDescriptor { url, init }) => {
                Self::http_kind(url, init, transport)?
            }
        };
        Ok(Self { kind })
    }

    fn http_kind(
        url: String,
        init: RequestInit,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<InvokerKind<P, R>> {
        if url.trim().is_empty() {
            return Err(Error::unsupported_request().with_message("request URL is empty"));
        }
        let Some(transport) = transport else {
            return Err(Error::unsupported_request()
                .with_message("URL request configured without a transport"));
        };
        Ok(InvokerKind::Http {
            url,
            init,
            transport,
        })
    }

    /// Dispatches one call.
    ///
    /// Handler requests receive the call arguments; URL requests ignore them
    /// (the arguments still land in slot `params` for refresh and key
    /// derivation). A non-success status becomes an HTTP error carrying the
    /// status text; a success body is decoded into `R`.
    pub async fn invoke(&self, args: P) -> Result<R> {
        match &self.kind {
            InvokerKind::Handler(handler) => handler(args).await,
            InvokerKind::Http {
                url,
                init,
                transport,
            } => {
                tracing::debug!(target: TRACING_TARGET, url = %url, "Dispatching HTTP request");
                let response = transport.fetch(url, init).await?;
                if !response.is_success() {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        url = %url,
                        status = response.status,
                        "HTTP request settled with non-success status"
                    );
                    return Err(Error::http(response.status, response.status_text));
                }
                serde_json::from_value(response.body).map_err(Error::from)
            }
        }
    }
}

impl<P, R> std::fmt::Debug for Invoker<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            InvokerKind::Handler(_) => f.debug_struct("Invoker").field("kind", &"handler").finish(),
            InvokerKind::Http { url, .. } => f
                .debug_struct("Invoker")
                .field("kind", &"http")
                .field("url", url)
                .finish(),
        }
    }
}
