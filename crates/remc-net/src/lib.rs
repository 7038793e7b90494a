//! # REMC Net
//!
//! Request and response model seen by the offline worker, plus the network
//! boundary it fetches through.
//!
//! ## Design Goals
//!
//! 1. **Snapshot responses**: bodies are immutable `Bytes`, so a response can
//!    be delivered to the page and stored in a cache at the same time
//! 2. **Response typing**: every response is tagged `basic`, `cors`,
//!    `opaque` or `error` the way a browser tags it
//! 3. **Swappable network**: the worker only sees the [`Fetcher`] trait

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use remc_common::RemcError;
use thiserror::Error;
use url::Url;

pub mod http_fetcher;

pub use http_fetcher::{HttpFetcher, LoaderConfig};

/// Errors that can occur on the network boundary.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The host could not be reached at all.
    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for RemcError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Timeout(limit) => RemcError::Timeout(limit),
            other => RemcError::network_with_source("fetch failed", other),
        }
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level document load (a navigation).
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// `fetch()` / XHR.
    #[default]
    Empty,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub destination: Destination,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            destination: Destination::Empty,
        }
    }

    /// Create a navigation (document) request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).destination(Destination::Document)
    }

    /// Replace the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this is a full document load.
    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }
}

/// Response tainting, as a browser reports it in `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Same-origin.
    #[default]
    Basic,
    /// Cross-origin with CORS.
    Cors,
    /// Cross-origin, no-cors; status and body hidden.
    Opaque,
    /// Network error placeholder.
    Error,
}

impl ResponseType {
    /// Classify a response by whether its final URL shares `origin`.
    pub fn classify(origin: &Url, final_url: &Url) -> Self {
        if origin.origin() == final_url.origin() {
            Self::Basic
        } else {
            Self::Cors
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    /// Whether any redirect was followed.
    pub redirected: bool,
    body: Bytes,
}

impl Response {
    /// Create a same-origin response with an empty body.
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            response_type: ResponseType::Basic,
            redirected: false,
            body: Bytes::new(),
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Mark as the result of a followed redirect.
    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// The network as seen from the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the round-trip. HTTP error statuses are `Ok`; only transport
    /// failures are `Err`.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}
