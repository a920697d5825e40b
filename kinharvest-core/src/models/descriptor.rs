//! Request descriptors.
//!
//! A [`RequestDescriptor`] is an immutable, caller-built description of one
//! vendor request. Descriptors carry no transport state; they are handed to
//! the session layer, which owns cookies and retries.

use std::fmt;

// ============================================================================
// Profile Identity
// ============================================================================

/// Opaque identifier for a managed sub-profile under one login.
///
/// Vendors let a single account administer several genetic-test records
/// (siblings, managed kits). Which one is "active" is server-side session
/// state, so profile-scoped requests must name their target profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileId(String);

impl ProfileId {
    /// Creates a profile identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// HTTP method used by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Plain GET.
    Get,
    /// Form-encoded POST.
    Post,
}

/// Whether a request depends on the server-side active profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestScope {
    /// Valid regardless of which profile is active.
    Account,
    /// Only meaningful while the named profile is active server-side.
    Profile(ProfileId),
}

/// Immutable description of one vendor request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Full request URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Form fields for POST requests; empty for GET.
    pub form: Vec<(String, String)>,
    /// Whether to mark the request as an XHR call.
    pub xhr: bool,
    /// Profile scoping for this request.
    pub scope: RequestScope,
}

impl RequestDescriptor {
    /// Creates a GET descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            form: Vec::new(),
            xhr: false,
            scope: RequestScope::Account,
        }
    }

    /// Creates a form-encoded POST descriptor.
    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            form,
            xhr: false,
            scope: RequestScope::Account,
        }
    }

    /// Marks the request as an XHR call.
    pub fn with_xhr(mut self) -> Self {
        self.xhr = true;
        self
    }

    /// Scopes the request to a profile.
    pub fn scoped_to(mut self, profile: ProfileId) -> Self {
        self.scope = RequestScope::Profile(profile);
        self
    }

    /// Returns the target profile if the request is profile-scoped.
    pub fn target_profile(&self) -> Option<&ProfileId> {
        match &self.scope {
            RequestScope::Account => None,
            RequestScope::Profile(id) => Some(id),
        }
    }
}
