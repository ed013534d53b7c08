//! Authenticated session state.
//!
//! A [`Session`] owns everything that must stay consistent across the service
//! round-trips of one run: the login token and its age, and the sequence
//! stamp counter. Resolver, planner and crawler borrow the session; nothing
//! here is global.
//!
//! # Stamp ordering
//!
//! Every Download envelope carries a stamp taken from [`Session::next_stamp`].
//! Stamps strictly increase within a session. Whenever a response reveals a
//! server-side stamp `N`, the counter moves to at least `N + 1000` so that
//! other processes sharing the login do not collide with this one. The
//! counter never moves backwards.

mod credentials;
mod error;

pub use credentials::Credentials;
pub use error::{CredentialsError, SessionError};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::protocol::{
    Disposition, Endpoints, ListEntry, SERVICE_HEADERS, SOAP_ACTION_AUTH, SOAP_ACTION_DOWNLOAD,
    decode_auth_response, decode_auth_status, decode_server_stamp, encode_auth_request,
    encode_download_request,
};
use crate::transport::{Transport, TransportRequest};

/// How long a login token is reused before logging in again.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Headroom added to a server-reported stamp.
pub const SERVER_STAMP_HEADROOM: u64 = 1000;

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    last_login_at: Option<Instant>,
}

impl AuthState {
    fn fresh_token(&self, ttl: Duration) -> Option<&str> {
        match (&self.token, self.last_login_at) {
            (Some(token), Some(at)) if at.elapsed() < ttl => Some(token),
            _ => None,
        }
    }
}

/// One authenticated context per set of credentials.
pub struct Session {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    credentials: Credentials,
    ttl: Duration,
    stamp: AtomicU64,
    auth: Mutex<AuthState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoints", &self.endpoints)
            .field("credentials", &self.credentials)
            .field("ttl", &self.ttl)
            .field("stamp", &self.current_stamp())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session that has not logged in yet.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        credentials: Credentials,
    ) -> Self {
        Self {
            transport,
            endpoints,
            credentials,
            ttl: DEFAULT_SESSION_TTL,
            stamp: AtomicU64::new(0),
            auth: Mutex::new(AuthState::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the token reuse window.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the first stamp this session hands out.
    #[must_use]
    pub fn with_starting_stamp(self, offset: u64) -> Self {
        self.stamp.store(offset, Ordering::SeqCst);
        self
    }

    /// Ties the session to a cancellation token checked before each round-trip.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the shared transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Returns the service and site locations.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the stamp the next envelope will carry, without consuming it.
    #[must_use]
    pub fn current_stamp(&self) -> u64 {
        self.stamp.load(Ordering::SeqCst)
    }

    /// Returns the current stamp and advances the counter.
    pub fn next_stamp(&self) -> u64 {
        self.stamp.fetch_add(1, Ordering::SeqCst)
    }

    /// Ratchets the counter past any server stamp found in `body`.
    pub fn observe(&self, body: &str) {
        if let Some(server_stamp) = decode_server_stamp(body) {
            let floor = server_stamp.saturating_add(SERVER_STAMP_HEADROOM);
            let previous = self.stamp.fetch_max(floor, Ordering::SeqCst);
            if floor > previous {
                debug!(server_stamp, stamp = floor, "advanced sequence stamp");
            }
        }
    }

    /// Logs in unless a token younger than the TTL is cached, returning the token.
    ///
    /// A failed login is not cached, so the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authentication`] when the response carries no
    /// token, or a transport/cancellation error if the round-trip fails.
    #[instrument(level = "debug", skip(self), fields(user = %self.credentials.username()))]
    pub async fn ensure_authenticated(&self) -> Result<String, SessionError> {
        let mut state = self.auth.lock().await;
        if let Some(token) = state.fresh_token(self.ttl) {
            debug!("reusing session token");
            return Ok(token.to_string());
        }

        let started = Instant::now();
        let request = service_request(
            &self.endpoints.service_url,
            SOAP_ACTION_AUTH,
            encode_auth_request(&self.credentials),
        );
        let body = self.round_trip(request).await?;

        let Some(token) = decode_auth_response(&body) else {
            let status = decode_auth_status(&body);
            warn!(status = status.as_deref().unwrap_or("unknown"), "login failed");
            return Err(SessionError::authentication(
                self.credentials.username(),
                status,
            ));
        };

        info!("logged in");
        state.token = Some(token.clone());
        state.last_login_at = Some(started);
        Ok(token)
    }

    /// Sends a Download envelope carrying `entries` and returns the response body.
    ///
    /// # Errors
    ///
    /// Propagates authentication, transport and cancellation failures.
    pub async fn download_call<E: ListEntry + Sync>(
        &self,
        entries: &[E],
    ) -> Result<String, SessionError> {
        let token = self.ensure_authenticated().await?;
        let stamp = self.next_stamp();
        debug!(stamp, entries = entries.len(), "sending download envelope");
        let request = service_request(
            &self.endpoints.service_url,
            SOAP_ACTION_DOWNLOAD,
            encode_download_request(&token, stamp, entries, Disposition::Download),
        );
        self.round_trip(request).await
    }

    /// Fetches a site page (folder listing) through the session.
    ///
    /// # Errors
    ///
    /// Propagates transport and cancellation failures.
    pub async fn fetch_page(&self, url: &str) -> Result<String, SessionError> {
        let mut request = TransportRequest::get(url);
        for (name, value) in SERVICE_HEADERS.iter().skip(1) {
            request = request.header(*name, *value);
        }
        self.round_trip(request).await
    }

    async fn round_trip(&self, request: TransportRequest) -> Result<String, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::cancelled(request.url));
        }
        let response = self.transport.send(request).await?;
        let body = response.text();
        self.observe(&body);
        Ok(body)
    }
}

fn service_request(url: &str, action: &str, body: String) -> TransportRequest {
    let mut request = TransportRequest::post(url, body).header("SOAPAction", action);
    for (name, value) in SERVICE_HEADERS {
        request = request.header(name, value);
    }
    request
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::protocol::ResolveEntry;
    use crate::transport::{TransportError, TransportResponse, TransportStream};

    /// Answers Auth envelopes with a fixed body and everything else from a queue.
    struct ScriptedTransport {
        auth_body: String,
        replies: StdMutex<VecDeque<String>>,
        requests: StdMutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(auth_body: &str, replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                auth_body: auth_body.to_string(),
                replies: StdMutex::new(replies.iter().map(ToString::to_string).collect()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn auth_calls(&self) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.header_value("SOAPAction") == Some(SOAP_ACTION_AUTH))
                .count()
        }

        fn sent_stamps(&self) -> Vec<u64> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| r.body.as_deref())
                .filter_map(|body| {
                    let start = body.find("<stamp>")? + "<stamp>".len();
                    let end = body[start..].find("</stamp>")? + start;
                    body[start..end].parse().ok()
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let is_auth = request.header_value("SOAPAction") == Some(SOAP_ACTION_AUTH);
            self.requests.lock().unwrap().push(request);
            let body = if is_auth {
                self.auth_body.clone()
            } else {
                self.replies.lock().unwrap().pop_front().unwrap_or_default()
            };
            Ok(TransportResponse {
                status: 200,
                body: body.into_bytes(),
            })
        }

        async fn stream(
            &self,
            request: TransportRequest,
        ) -> Result<TransportStream, TransportError> {
            Err(TransportError::interrupted(request.url, "not scripted"))
        }
    }

    const AUTH_OK: &str = "<a:status>Ok</a:status><a:token>tok-1</a:token>";

    fn session(transport: Arc<ScriptedTransport>) -> Session {
        Session::new(
            transport,
            Endpoints::new("http://svc.test/svc", "http://site.test/"),
            Credentials::from_password("chomik", "secret").unwrap(),
        )
    }

    fn entries() -> Vec<ResolveEntry> {
        vec![ResolveEntry {
            path: "/chomik/a.pdf".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_ensure_authenticated_reuses_token_within_ttl() {
        let transport = ScriptedTransport::new(AUTH_OK, &[]);
        let session = session(Arc::clone(&transport));

        assert_eq!(session.ensure_authenticated().await.unwrap(), "tok-1");
        assert_eq!(session.ensure_authenticated().await.unwrap(), "tok-1");
        assert_eq!(transport.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_logs_in_again() {
        let transport = ScriptedTransport::new(AUTH_OK, &[]);
        let session = session(Arc::clone(&transport)).with_ttl(Duration::ZERO);

        session.ensure_authenticated().await.unwrap();
        session.ensure_authenticated().await.unwrap();
        assert_eq!(transport.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_login_is_not_cached() {
        let transport = ScriptedTransport::new("<a:status>Error</a:status><a:token></a:token>", &[]);
        let session = session(Arc::clone(&transport));

        let error = session.ensure_authenticated().await.unwrap_err();
        assert!(
            matches!(&error, SessionError::Authentication { status, .. } if status == "ERROR"),
            "unexpected error: {error:?}"
        );
        assert!(session.ensure_authenticated().await.is_err());
        assert_eq!(transport.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_stamps_strictly_increase_across_calls() {
        let transport = ScriptedTransport::new(AUTH_OK, &["", "", ""]);
        let session = session(Arc::clone(&transport)).with_starting_stamp(10);

        for _ in 0..3 {
            session.download_call(&entries()).await.unwrap();
        }
        assert_eq!(transport.sent_stamps(), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_server_stamp_ratchets_counter() {
        let transport = ScriptedTransport::new(
            AUTH_OK,
            &["<a:messageSequence><stamp>500</stamp></a:messageSequence>", ""],
        );
        let session = session(Arc::clone(&transport));

        session.download_call(&entries()).await.unwrap();
        session.download_call(&entries()).await.unwrap();
        assert_eq!(transport.sent_stamps(), vec![0, 1500]);
        assert_eq!(session.current_stamp(), 1501);
    }

    #[test]
    fn test_observe_never_moves_backwards() {
        let transport = ScriptedTransport::new(AUTH_OK, &[]);
        let session = session(transport).with_starting_stamp(5000);

        session.observe("<a:messageSequence><stamp>10</stamp>");
        assert_eq!(session.current_stamp(), 5000);
        session.observe("<a:messageSequence><stamp>4500</stamp>");
        assert_eq!(session.current_stamp(), 5500);
    }

    #[tokio::test]
    async fn test_cancelled_session_issues_no_requests() {
        let transport = ScriptedTransport::new(AUTH_OK, &[]);
        let cancel = CancellationToken::new();
        let session = session(Arc::clone(&transport)).with_cancellation(cancel.clone());
        cancel.cancel();

        let error = session.ensure_authenticated().await.unwrap_err();
        assert!(matches!(error, SessionError::Cancelled { .. }));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_request_headers_follow_soap_action() {
        let transport = ScriptedTransport::new(AUTH_OK, &[]);
        let session = session(Arc::clone(&transport));
        session.ensure_authenticated().await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let names: Vec<_> = requests[0].headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SOAPAction",
                "Content-Type",
                "Connection",
                "Accept-Language",
                "User-Agent"
            ]
        );
    }
}
