//! `reqwest`-backed [`Transport`] implementation.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{Transport, TransportError, TransportRequest, TransportResponse, TransportStream};

/// Default connect timeout for service envelopes and folder pages.
pub const DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default read timeout for service envelopes and folder pages.
pub const DEFAULT_SERVICE_READ_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout for file bodies.
pub const DEFAULT_FILE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout for file bodies: the longest silence tolerated
/// between two chunks, not a cap on the whole transfer.
pub const DEFAULT_FILE_READ_TIMEOUT_SECS: u64 = 300;

/// Timeout settings for the two underlying clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Connect timeout for buffered round-trips.
    pub service_connect_secs: u64,
    /// Total timeout for buffered round-trips.
    pub service_read_secs: u64,
    /// Connect timeout for streamed file bodies.
    pub file_connect_secs: u64,
    /// Idle timeout between reads of a streamed file body.
    pub file_read_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            service_connect_secs: DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS,
            service_read_secs: DEFAULT_SERVICE_READ_TIMEOUT_SECS,
            file_connect_secs: DEFAULT_FILE_CONNECT_TIMEOUT_SECS,
            file_read_secs: DEFAULT_FILE_READ_TIMEOUT_SECS,
        }
    }
}

/// HTTP transport holding two pooled clients.
///
/// Buffered requests go through a client that never follows redirects, since
/// the service answers envelopes directly. Streamed requests follow redirects
/// because signed file links usually bounce through a CDN.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    service: Client,
    files: Client,
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if either client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(HttpTimeouts::default())
    }

    /// Creates a transport with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if either client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self, TransportError> {
        let service = build_client(ClientKind::Service, timeouts)?;
        let files = build_client(ClientKind::Files, timeouts)?;
        Ok(Self { service, files })
    }

    fn prepare(
        &self,
        client: &Client,
        request: TransportRequest,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        Url::parse(&request.url).map_err(|_| TransportError::invalid_url(request.url.clone()))?;

        let mut builder = client.request(request.method, request.url.as_str());
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        let response = self
            .prepare(&self.service, request)?
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?
            .to_vec();

        debug!(status, bytes = body.len(), "received response");
        Ok(TransportResponse { status, body })
    }

    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn stream(&self, request: TransportRequest) -> Result<TransportStream, TransportError> {
        let url = request.url.clone();
        let response = self
            .prepare(&self.files, request)?
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;

        let status = response.status().as_u16();
        debug!(status, "streaming response");

        let chunks = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(&url, e)))
            .boxed();
        Ok(TransportStream { status, chunks })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientKind {
    Service,
    Files,
}

/// How a client's read timeout is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadDeadline {
    /// Caps the whole request, body included.
    Total,
    /// Caps each wait for the next chunk; a long transfer that keeps
    /// receiving data never times out.
    Idle,
}

impl ClientKind {
    fn read_deadline(self) -> ReadDeadline {
        match self {
            Self::Service => ReadDeadline::Total,
            Self::Files => ReadDeadline::Idle,
        }
    }

    fn timeouts(self, timeouts: HttpTimeouts) -> (Duration, Duration) {
        match self {
            Self::Service => (
                Duration::from_secs(timeouts.service_connect_secs),
                Duration::from_secs(timeouts.service_read_secs),
            ),
            Self::Files => (
                Duration::from_secs(timeouts.file_connect_secs),
                Duration::from_secs(timeouts.file_read_secs),
            ),
        }
    }
}

fn build_client(kind: ClientKind, timeouts: HttpTimeouts) -> Result<Client, TransportError> {
    match try_build_client(kind, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                ?kind,
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(kind, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => Err(TransportError::ClientBuild {
                    reason: error.to_string(),
                }),
                Err(BuildClientFailure::Panic) => Err(TransportError::ClientBuild {
                    reason: "client builder panicked while applying env-proxy fallback"
                        .to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(TransportError::ClientBuild {
            reason: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// `catch_unwind` does not suppress panic-hook stderr output, so the hook is
// swapped out while a guarded build runs.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    kind: ClientKind,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind_silent(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(kind, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn catch_unwind_silent<F, T>(operation: F) -> Result<T, Box<dyn std::any::Any + Send + 'static>>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _panic_hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_client_builder(kind: ClientKind, timeouts: HttpTimeouts) -> ClientBuilder {
    let (connect, read) = kind.timeouts(timeouts);
    let builder = Client::builder().connect_timeout(connect);
    let builder = match kind.read_deadline() {
        ReadDeadline::Total => builder.timeout(read),
        ReadDeadline::Idle => builder.read_timeout(read),
    };
    match kind {
        ClientKind::Service => builder
            .redirect(Policy::none())
            .http1_only()
            .gzip(true),
        // No transparent decompression: byte offsets must match the stored file.
        ClientKind::Files => builder.redirect(Policy::limited(10)),
    }
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = HttpTimeouts::default();
        assert_eq!(timeouts.service_connect_secs, 10);
        assert_eq!(timeouts.service_read_secs, 30);
        assert_eq!(timeouts.file_connect_secs, 30);
        assert_eq!(timeouts.file_read_secs, 300);
    }

    #[test]
    fn test_file_bodies_use_idle_deadline() {
        assert_eq!(ClientKind::Files.read_deadline(), ReadDeadline::Idle);
        assert_eq!(ClientKind::Service.read_deadline(), ReadDeadline::Total);
    }

    #[test]
    fn test_client_kinds_pick_their_own_timeouts() {
        let timeouts = HttpTimeouts {
            service_connect_secs: 1,
            service_read_secs: 2,
            file_connect_secs: 3,
            file_read_secs: 4,
        };
        assert_eq!(
            ClientKind::Service.timeouts(timeouts),
            (Duration::from_secs(1), Duration::from_secs(2))
        );
        assert_eq!(
            ClientKind::Files.timeouts(timeouts),
            (Duration::from_secs(3), Duration::from_secs(4))
        );
    }

    #[test]
    fn test_transport_builds_with_default_timeouts() {
        assert!(HttpTransport::new().is_ok());
    }

    #[test]
    fn test_invalid_url_is_rejected_before_sending() {
        let transport = HttpTransport::new().unwrap();
        let result = tokio_test::block_on(transport.send(TransportRequest::get("not-a-url")));
        assert!(matches!(result, Err(TransportError::InvalidUrl { .. })));
    }

    #[test]
    fn test_find_first_proxy_var_skips_unset_names() {
        assert_eq!(
            find_first_proxy_var(&["CHOMIKBOX_TEST_SURELY_UNSET_PROXY_VAR"]),
            None
        );
    }
}
