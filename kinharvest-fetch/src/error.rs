//! Fetch error types.

use kinharvest_core::ParseError;
use thiserror::Error;

// ============================================================================
// Transport Error
// ============================================================================

/// Error type for the raw HTTP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request timed out before a response arrived.
    #[error("Request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request could not be constructed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

// ============================================================================
// Fetch Error
// ============================================================================

/// Error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure that retry could not absorb.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The resource denied access permanently (HTTP 403). Never retried.
    #[error("Access forbidden: {url}")]
    Forbidden {
        /// URL of the denied resource.
        url: String,
    },

    /// Expected markup/token marker was absent from a response body.
    #[error("Markup error: {0}")]
    Markup(#[from] ParseError),

    /// Login could not be completed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response arrived but did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    /// Returns true for failures that are terminal for the one resource
    /// rather than for the whole session.
    pub fn is_per_resource(&self) -> bool {
        matches!(self, FetchError::Forbidden { .. })
    }
}
