//! HTTP request/response collaborator.
//!
//! Everything above this module talks to the network through the [`Transport`]
//! trait: one buffered round-trip for service envelopes and folder pages, and
//! one streamed round-trip for file bodies. The transport performs no retries
//! and no parsing.
//!
//! [`HttpTransport`] is the `reqwest`-backed implementation used in production.

mod error;
mod http;

pub use error::TransportError;
pub use http::{
    DEFAULT_FILE_CONNECT_TIMEOUT_SECS, DEFAULT_FILE_READ_TIMEOUT_SECS,
    DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS, DEFAULT_SERVICE_READ_TIMEOUT_SECS, HttpTimeouts,
    HttpTransport,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
pub use reqwest::Method;

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Header name/value pairs, sent in order.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<String>,
}

impl TransportRequest {
    /// Creates a GET request with no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request carrying `body`.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header value with `name` (ASCII case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response whose body is consumed chunk by chunk.
pub struct TransportStream {
    /// HTTP status code.
    pub status: u16,
    /// Body chunks in arrival order.
    pub chunks: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl std::fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportStream")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Performs HTTP round-trips.
///
/// # Object Safety
///
/// This trait uses `async_trait` so the session, resolver and executor can
/// share one `Arc<dyn Transport>` and tests can substitute a scripted one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and buffers the whole response body.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Sends a request and returns the response body as a chunk stream.
    async fn stream(&self, request: TransportRequest) -> Result<TransportStream, TransportError>;
}
