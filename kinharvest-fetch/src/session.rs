//! Authenticated vendor session.
//!
//! [`AuthSession`] owns the credentials, the session cookie, and the
//! login/re-login flow, and exposes the single [`PerformRequest::perform`]
//! chokepoint every other component funnels through. No component issues a
//! raw network call.
//!
//! Session state is held behind a mutex with a single writer: workers read
//! a snapshot of the current cookie, and only the session itself replaces
//! the state (wholesale, on re-login). A generation counter makes each
//! replacement observable, so a worker that decides re-auth is needed can
//! tell whether a sibling already performed it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kinharvest_core::{Credentials, RequestDescriptor};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{FetchError, TransportError};
use crate::retry::{AbortReason, AttemptOutcome, Decision, RetryPolicy};
use crate::token::{self, TokenKind};
use crate::transport::{Transport, WireRequest, WireResponse};

/// HTTP status signalling a stale session contract version.
const STATUS_UPGRADE_REQUIRED: u16 = 426;

// ============================================================================
// Session State
// ============================================================================

/// The cookie material of one established login.
///
/// Replaced wholesale on every successful login; never mutated in place.
#[derive(Debug, Clone)]
pub struct SessionState {
    cookie_name: String,
    cookie_value: String,
    generation: u64,
    established_at: DateTime<Utc>,
}

impl SessionState {
    /// Returns the session cookie as a (name, value) pair.
    pub fn cookie(&self) -> (&str, &str) {
        (&self.cookie_name, &self.cookie_value)
    }

    /// Returns the login generation this state belongs to. Strictly
    /// increasing across re-logins within one session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns when this login was established.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

// ============================================================================
// Login Flow
// ============================================================================

/// How a vendor's login endpoint wants to be driven.
#[derive(Debug, Clone)]
pub enum LoginFlow {
    /// Two-step anti-forgery login: GET the login page for the CSRF cookie
    /// and the body token, then POST credentials plus token.
    CsrfForm {
        /// Login page URL, used for both steps and as the referer.
        login_url: String,
        /// Form field carrying the body token.
        token_field: String,
        /// Cookie carrying the anti-forgery value.
        csrf_cookie: String,
        /// Cookie the vendor sets on successful login.
        session_cookie: String,
    },
    /// Single credential POST.
    PlainForm {
        /// Login endpoint URL.
        login_url: String,
        /// Cookie the vendor sets on successful login.
        session_cookie: String,
    },
}

/// Vendor-specific session behavior.
pub struct SessionConfig {
    /// Login flow description.
    pub flow: LoginFlow,
    /// Retry classification policy.
    pub policy: RetryPolicy,
    /// Predicate recognizing a vendor busy signal inside an HTTP-200 body.
    pub soft_block: Option<fn(&str) -> bool>,
}

// ============================================================================
// Perform Seam
// ============================================================================

/// The single entry point for issuing vendor requests.
///
/// Higher components (profile routing, page collection, batch fetching)
/// depend on this trait rather than on [`AuthSession`] directly, so they
/// can be exercised against fakes.
#[async_trait]
pub trait PerformRequest: Send + Sync {
    /// Performs one request to completion, absorbing transient failures,
    /// soft blocks, and session expiry per the retry policy.
    ///
    /// # Errors
    ///
    /// Only terminal conditions surface: [`FetchError::Forbidden`] for a
    /// permanent denial of this resource, [`FetchError::Markup`] when a
    /// re-login hits unrecognizable markup, and
    /// [`FetchError::AuthenticationFailed`] when login itself is rejected.
    async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError>;
}

// ============================================================================
// Auth Session
// ============================================================================

struct SessionInner {
    state: Option<SessionState>,
    retry_count: u32,
}

/// Credential-holding session over a cookie-jar transport.
pub struct AuthSession {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
}

impl AuthSession {
    /// Creates a session without logging in. The first `perform` call will
    /// establish the login lazily.
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            config,
            inner: Mutex::new(SessionInner {
                state: None,
                retry_count: 0,
            }),
        }
    }

    /// Creates a session and logs in eagerly.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        config: SessionConfig,
    ) -> Result<Self, FetchError> {
        let session = Self::new(transport, credentials, config);
        session.login().await?;
        Ok(session)
    }

    /// Logs in, replacing any current session state.
    ///
    /// Transient failures retry indefinitely with the fixed policy delay;
    /// a process that cannot log in is not useful, so there is no retry
    /// ceiling here, unlike ordinary requests.
    pub async fn login(&self) -> Result<(), FetchError> {
        let mut inner = self.inner.lock().await;
        self.login_locked(&mut inner).await
    }

    /// Returns the generation of the current session state, or 0 if no
    /// login has happened yet.
    pub async fn generation(&self) -> u64 {
        self.inner
            .lock()
            .await
            .state
            .as_ref()
            .map_or(0, SessionState::generation)
    }

    async fn login_locked(&self, inner: &mut SessionInner) -> Result<(), FetchError> {
        let generation = inner.state.as_ref().map_or(0, SessionState::generation) + 1;

        let (cookie_name, cookie_value) = match &self.config.flow {
            LoginFlow::CsrfForm {
                login_url,
                token_field,
                csrf_cookie,
                session_cookie,
            } => {
                self.login_csrf(login_url, token_field, csrf_cookie, session_cookie)
                    .await?
            }
            LoginFlow::PlainForm {
                login_url,
                session_cookie,
            } => self.login_plain(login_url, session_cookie).await?,
        };

        info!(generation, "Login established");

        inner.state = Some(SessionState {
            cookie_name,
            cookie_value,
            generation,
            established_at: Utc::now(),
        });
        inner.retry_count = 0;
        Ok(())
    }

    /// Executes one wire request inside a login loop, retrying transient
    /// failures forever. Returns `None` when the whole flow must restart
    /// from its first step (the anti-forgery material went stale with the
    /// failed exchange).
    async fn login_step(&self, request: &WireRequest) -> Result<Option<WireResponse>, FetchError> {
        match self.transport.execute(request).await {
            Ok(response) => Ok(Some(response)),
            Err(TransportError::Timeout) => {
                warn!(url = %request.url, "Login request timed out");
                Ok(None)
            }
            Err(TransportError::Connection(reason)) => {
                warn!(url = %request.url, %reason, "Login connection failed");
                tokio::time::sleep(self.config.policy.wait).await;
                Ok(None)
            }
            Err(other) => Err(other.into()),
        }
    }

    #[instrument(skip_all, fields(url = %login_url))]
    async fn login_csrf(
        &self,
        login_url: &str,
        token_field: &str,
        csrf_cookie: &str,
        session_cookie: &str,
    ) -> Result<(String, String), FetchError> {
        loop {
            let Some(page) = self.login_step(&WireRequest::get(login_url)).await? else {
                continue;
            };

            let csrf_value = page.cookie(csrf_cookie).ok_or_else(|| {
                FetchError::AuthenticationFailed(format!(
                    "login page set no {} cookie",
                    csrf_cookie
                ))
            })?;
            let body_token = token::extract(&page.body, TokenKind::CsrfMiddlewareToken)?;

            let post = WireRequest::post(
                login_url,
                vec![
                    (token_field.to_string(), body_token),
                    ("username".to_string(), self.credentials.username().to_string()),
                    ("password".to_string(), self.credentials.password().to_string()),
                ],
            )
            // The vendor rejects token POSTs without a referer with a 403.
            .with_header("referer", login_url)
            .with_cookie(csrf_cookie, csrf_value);

            let Some(response) = self.login_step(&post).await? else {
                continue;
            };

            match response.cookie(session_cookie) {
                Some(value) => return Ok((session_cookie.to_string(), value.to_string())),
                None => {
                    return Err(FetchError::AuthenticationFailed(format!(
                        "login rejected: no {} cookie in response",
                        session_cookie
                    )));
                }
            }
        }
    }

    #[instrument(skip_all, fields(url = %login_url))]
    async fn login_plain(
        &self,
        login_url: &str,
        session_cookie: &str,
    ) -> Result<(String, String), FetchError> {
        let form = vec![
            ("username".to_string(), self.credentials.username().to_string()),
            ("password".to_string(), self.credentials.password().to_string()),
        ];

        loop {
            let request = WireRequest::post(login_url, form.clone());
            let Some(response) = self.login_step(&request).await? else {
                continue;
            };

            match response.cookie(session_cookie) {
                Some(value) => return Ok((session_cookie.to_string(), value.to_string())),
                None => {
                    return Err(FetchError::AuthenticationFailed(format!(
                        "login rejected: no {} cookie in response",
                        session_cookie
                    )));
                }
            }
        }
    }

    /// Builds the wire request for a descriptor under the given session
    /// cookie.
    fn wire_request(
        &self,
        descriptor: &RequestDescriptor,
        cookie_name: &str,
        cookie_value: &str,
    ) -> WireRequest {
        let mut request = WireRequest {
            method: descriptor.method,
            url: descriptor.url.clone(),
            form: descriptor.form.clone(),
            headers: Vec::new(),
            cookies: vec![(cookie_name.to_string(), cookie_value.to_string())],
        };
        if descriptor.xhr {
            request = request.with_header("X-Requested-With", "XMLHttpRequest");
        }
        request
    }

    /// Reduces a completed response to an attempt outcome.
    fn outcome_of(&self, response: WireResponse) -> AttemptOutcome {
        match response.status {
            503 => AttemptOutcome::SoftBlock,
            STATUS_UPGRADE_REQUIRED => AttemptOutcome::SessionExpired,
            status if !response.is_success() => AttemptOutcome::HttpStatus(status),
            _ => {
                if self.config.soft_block.is_some_and(|pred| pred(&response.body)) {
                    AttemptOutcome::SoftBlock
                } else {
                    AttemptOutcome::Success(response.body)
                }
            }
        }
    }
}

#[async_trait]
impl PerformRequest for AuthSession {
    #[instrument(skip(self), fields(url = %descriptor.url))]
    async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
        loop {
            // Snapshot the current state; only login_locked may replace it.
            let (cookie_name, cookie_value, generation, retries) = {
                let mut inner = self.inner.lock().await;
                if inner.state.is_none() {
                    self.login_locked(&mut inner).await?;
                }
                match &inner.state {
                    Some(state) => (
                        state.cookie_name.clone(),
                        state.cookie_value.clone(),
                        state.generation,
                        inner.retry_count,
                    ),
                    None => {
                        return Err(FetchError::AuthenticationFailed(
                            "session not established".to_string(),
                        ));
                    }
                }
            };

            let request = self.wire_request(descriptor, &cookie_name, &cookie_value);
            let outcome = match self.transport.execute(&request).await {
                Ok(response) => self.outcome_of(response),
                Err(TransportError::Timeout) => AttemptOutcome::Timeout,
                Err(TransportError::Connection(_)) => AttemptOutcome::Connection,
                Err(other) => return Err(other.into()),
            };

            match self.config.policy.classify(&outcome, retries) {
                Decision::Accept => {
                    if let AttemptOutcome::Success(body) = outcome {
                        return Ok(body);
                    }
                    return Err(FetchError::InvalidResponse(
                        "accepted a non-success outcome".to_string(),
                    ));
                }

                Decision::RetryAfter { wait, counted } => {
                    debug!(url = %descriptor.url, ?outcome, counted, "Retrying after wait");
                    if counted {
                        self.inner.lock().await.retry_count += 1;
                    }
                    tokio::time::sleep(wait).await;
                }

                Decision::ReAuthThenRetry => {
                    let mut inner = self.inner.lock().await;
                    let current = inner.state.as_ref().map_or(0, SessionState::generation);
                    if current == generation {
                        warn!(url = %descriptor.url, generation, "Re-establishing session");
                        self.login_locked(&mut inner).await?;
                    }
                    // Otherwise a sibling already re-logged-in; just retry.
                }

                Decision::Abort(AbortReason::Forbidden) => {
                    warn!(url = %descriptor.url, "Access forbidden, not retrying");
                    return Err(FetchError::Forbidden {
                        url: descriptor.url.clone(),
                    });
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kinharvest_core::Method;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Scripted transport replaying a fixed sequence of replies while
    /// recording every request it sees.
    struct ScriptedTransport {
        script: StdMutex<VecDeque<Reply>>,
        seen: StdMutex<Vec<WireRequest>>,
    }

    enum Reply {
        Respond(WireResponse),
        Timeout,
        Connection,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<WireRequest> {
            self.seen.lock().unwrap().clone()
        }

        fn posts_to(&self, url: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.method == Method::Post && r.url == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            match self.script.lock().unwrap().pop_front() {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Timeout) => Err(TransportError::Timeout),
                Some(Reply::Connection) => {
                    Err(TransportError::Connection("reset by peer".to_string()))
                }
                None => panic!("transport script exhausted for {}", request.url),
            }
        }
    }

    fn ok(body: &str) -> Reply {
        Reply::Respond(WireResponse {
            status: 200,
            body: body.to_string(),
            cookies: Vec::new(),
        })
    }

    fn status(code: u16) -> Reply {
        Reply::Respond(WireResponse {
            status: code,
            body: String::new(),
            cookies: Vec::new(),
        })
    }

    fn login_ok() -> Reply {
        Reply::Respond(WireResponse {
            status: 200,
            body: String::new(),
            cookies: vec![("ATT".to_string(), "session-token".to_string())],
        })
    }

    fn config() -> SessionConfig {
        SessionConfig {
            flow: LoginFlow::PlainForm {
                login_url: "https://vendor.example/login".to_string(),
                session_cookie: "ATT".to_string(),
            },
            policy: RetryPolicy::new(Duration::from_secs(60)).with_max_attempts(3),
            soft_block: None,
        }
    }

    fn creds() -> Credentials {
        Credentials::new("user", "pass")
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_retries_connection_errors_with_sleeps() {
        let transport = ScriptedTransport::new(vec![Reply::Connection, Reply::Connection, login_ok()]);
        let started = tokio::time::Instant::now();

        let session = AuthSession::connect(transport.clone(), creds(), config())
            .await
            .unwrap();

        // Three POSTs total, with the fixed wait slept after each failure.
        assert_eq!(transport.posts_to("https://vendor.example/login"), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        assert_eq!(session.generation().await, 1);
    }

    #[tokio::test]
    async fn test_login_rejection_is_fatal() {
        // A completed login response without the session cookie means bad
        // credentials, not a transient condition.
        let transport = ScriptedTransport::new(vec![ok("login page")]);

        let result = AuthSession::connect(transport, creds(), config()).await;
        assert!(matches!(
            result,
            Err(FetchError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_retries_transients_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            login_ok(),
            Reply::Timeout,
            Reply::Connection,
            ok("payload"),
        ]);
        let session = AuthSession::connect(transport.clone(), creds(), config())
            .await
            .unwrap();

        let body = session
            .perform(&RequestDescriptor::get("https://vendor.example/data"))
            .await
            .unwrap();

        assert_eq!(body, "payload");
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_forbidden_is_terminal_and_not_retried() {
        let transport = ScriptedTransport::new(vec![login_ok(), status(403)]);
        let session = AuthSession::connect(transport.clone(), creds(), config())
            .await
            .unwrap();

        let result = session
            .perform(&RequestDescriptor::get("https://vendor.example/private"))
            .await;

        assert!(matches!(result, Err(FetchError::Forbidden { .. })));
        // Login plus exactly one attempt; the 403 produced no retry.
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry_triggers_single_relogin() {
        let transport = ScriptedTransport::new(vec![
            login_ok(),
            status(426),
            login_ok(),
            ok("fresh"),
        ]);
        let session = AuthSession::connect(transport.clone(), creds(), config())
            .await
            .unwrap();
        let before = session.generation().await;

        let body = session
            .perform(&RequestDescriptor::get("https://vendor.example/data"))
            .await
            .unwrap();

        assert_eq!(body, "fresh");
        assert_eq!(transport.posts_to("https://vendor.example/login"), 2);
        assert_eq!(session.generation().await, before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_errors_exhaust_counter_then_relogin() {
        let policy_max = 2;
        let mut script = vec![login_ok()];
        // Counted retries up to the ceiling, then one more error forces
        // re-auth, after which the request succeeds.
        script.extend([status(500), status(500), status(500)]);
        script.push(login_ok());
        script.push(ok("recovered"));

        let mut config = config();
        config.policy = RetryPolicy::new(Duration::from_secs(1)).with_max_attempts(policy_max);

        let transport = ScriptedTransport::new(script);
        let session = AuthSession::connect(transport.clone(), creds(), config)
            .await
            .unwrap();

        let body = session
            .perform(&RequestDescriptor::get("https://vendor.example/flaky"))
            .await
            .unwrap();

        assert_eq!(body, "recovered");
        assert_eq!(transport.posts_to("https://vendor.example/login"), 2);
        assert_eq!(session.generation().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_block_body_retries_uncounted() {
        let mut config = config();
        config.soft_block = Some(|body: &str| body.trim() == "191919");

        let transport = ScriptedTransport::new(vec![login_ok(), ok("191919"), ok("real data")]);
        let session = AuthSession::connect(transport.clone(), creds(), config)
            .await
            .unwrap();

        let body = session
            .perform(&RequestDescriptor::get("https://vendor.example/busy"))
            .await
            .unwrap();

        assert_eq!(body, "real data");
        // No re-login happened along the way.
        assert_eq!(transport.posts_to("https://vendor.example/login"), 1);
    }

    #[tokio::test]
    async fn test_xhr_and_session_cookie_on_wire() {
        let transport = ScriptedTransport::new(vec![login_ok(), ok("{}")]);
        let session = AuthSession::connect(transport.clone(), creds(), config())
            .await
            .unwrap();

        session
            .perform(&RequestDescriptor::get("https://vendor.example/ajax").with_xhr())
            .await
            .unwrap();

        let requests = transport.requests();
        let data_request = &requests[1];
        assert!(data_request
            .headers
            .iter()
            .any(|(n, v)| n == "X-Requested-With" && v == "XMLHttpRequest"));
        assert!(data_request
            .cookies
            .iter()
            .any(|(n, v)| n == "ATT" && v == "session-token"));
    }
}
