//! Core error types for KinHarvest.

use thiserror::Error;

/// Error raised when an expected marker cannot be located in a vendor
/// response body.
///
/// A parse failure means the site markup itself changed shape, so it is
/// always fatal to the operation that hit it: re-requesting an unchanged
/// page cannot produce a different parse result.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The marker the extractor searched for is absent from the body.
    #[error("Marker not found in response body: {marker}")]
    MissingMarker {
        /// Human-readable name of the marker that was expected.
        marker: &'static str,
    },

    /// The marker was found but its payload could not be decoded.
    #[error("Malformed {marker}: {detail}")]
    Malformed {
        /// Human-readable name of the marker.
        marker: &'static str,
        /// What went wrong while decoding the payload.
        detail: String,
    },
}

impl ParseError {
    /// Creates a malformed-payload error.
    pub fn malformed(marker: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            marker,
            detail: detail.into(),
        }
    }
}
