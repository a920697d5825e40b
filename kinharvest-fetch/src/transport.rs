//! HTTP transport seam.
//!
//! All network traffic goes through the [`Transport`] trait so the session
//! layer can be exercised against scripted fakes. The production
//! implementation wraps `reqwest` with a cookie jar and a fixed timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kinharvest_core::Method;
use reqwest::cookie::{CookieStore, Jar};
use tracing::debug;

use crate::error::TransportError;

/// Default request timeout in seconds, matching the vendor-facing scripts
/// this client descends from.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Wire Request / Response
// ============================================================================

/// A fully resolved request ready to hit the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Full URL.
    pub url: String,
    /// Form fields for POST requests.
    pub form: Vec<(String, String)>,
    /// Extra headers (referer, XHR marker).
    pub headers: Vec<(String, String)>,
    /// Cookies sent explicitly on top of the transport's jar.
    pub cookies: Vec<(String, String)>,
}

impl WireRequest {
    /// Creates a bare GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Creates a form POST request.
    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            form,
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds an explicit cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded response body.
    pub body: String,
    /// Cookies set by this response.
    pub cookies: Vec<(String, String)>,
}

impl WireResponse {
    /// Returns the value of a cookie set by this response, if any.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Cookie-jar HTTP transport with a configurable timeout.
///
/// Implementations carry their own cookie state across calls; the session
/// layer additionally pins its session cookie per request, so a jar reset
/// on the vendor side cannot silently detach an established session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one request and returns the completed response.
    ///
    /// A non-2xx status is a normal completion here; only transport-level
    /// failures (timeout, connection loss) are errors.
    async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportError>;
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// Production transport backed by `reqwest` with an in-memory cookie jar.
///
/// The jar is held explicitly rather than through `cookie_store(true)`:
/// the client follows redirects, and a cookie set on an intermediate hop
/// (a login replying 302 with its session cookie) never appears on the
/// final response's `Set-Cookie` headers. Reading the jar back after the
/// exchange surfaces every hop's cookies, the way the vendor scripts read
/// their accumulated session jar.
#[derive(Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(jar.clone())
            .user_agent(concat!("kinharvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self { inner, jar })
    }
}

/// Folds the cookies of a `Cookie` request header into a response cookie
/// list, keeping existing entries over jar entries for the same name.
fn merge_cookie_header(cookies: &mut Vec<(String, String)>, header: &str) {
    for pair in header.split("; ") {
        if let Some((name, value)) = pair.split_once('=') {
            if !cookies.iter().any(|(n, _)| n == name) {
                cookies.push((name.to_string(), value.to_string()));
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        debug!(url = %request.url, method = ?request.method, "Executing request");

        let mut builder = match request.method {
            Method::Get => self.inner.get(&request.url),
            Method::Post => self.inner.post(&request.url).form(&request.form),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if !request.cookies.is_empty() {
            let header = request
                .cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(reqwest::header::COOKIE, header);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut cookies: Vec<(String, String)> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        // Cookies set on intermediate redirect hops only exist in the jar.
        if let Ok(url) = reqwest::Url::parse(&request.url) {
            if let Some(header) = self.jar.cookies(&url) {
                if let Ok(joined) = header.to_str() {
                    merge_cookie_header(&mut cookies, joined);
                }
            }
        }
        let body = response.text().await?;

        debug!(url = %request.url, status, len = body.len(), "Request completed");

        Ok(WireResponse {
            status,
            body,
            cookies,
        })
    }
}
