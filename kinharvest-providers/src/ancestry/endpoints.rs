//! AncestryDNA endpoint descriptors and session configuration.

use std::time::Duration;

use kinharvest_core::RequestDescriptor;
use kinharvest_fetch::{LoginFlow, RetryPolicy, SessionConfig};

/// Credential sink; the session cookie arrives on the reply.
pub const LOGIN_URL: &str = "https://www.ancestry.com/secure/login";

/// Default secure API prefix.
pub const DEFAULT_BASE_URL: &str = "https://www.ancestry.com/dna/secure/";

/// Returns the plain form-POST login flow for this vendor.
pub fn login_flow() -> LoginFlow {
    LoginFlow::PlainForm {
        login_url: LOGIN_URL.to_string(),
        session_cookie: "ATT".to_string(),
    }
}

/// Builds the session configuration with the given fixed timeout/delay.
/// This vendor signals overload with real HTTP statuses, so no soft-block
/// predicate is installed.
pub fn session_config(timeout: Duration) -> SessionConfig {
    SessionConfig {
        flow: login_flow(),
        policy: RetryPolicy::new(timeout),
        soft_block: None,
    }
}

/// Descriptor builders rooted at one API prefix.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    /// Creates builders over the default API prefix.
    pub fn new() -> Self {
        Self::with_base(DEFAULT_BASE_URL)
    }

    /// Creates builders over a custom API prefix.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Tests handled by the account.
    pub fn tests(&self) -> RequestDescriptor {
        RequestDescriptor::get(format!("{}tests", self.base))
    }

    /// Subject details for one test.
    pub fn test_info(&self, guid: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("{}testSettings/{}/testInfo", self.base, guid))
    }

    /// Parent test links for one test.
    pub fn parents(&self, guid: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("{}tests/{}/parents", self.base, guid))
    }

    /// One page of the match listing for a test.
    pub fn matches_page(&self, guid: &str, page: u32) -> RequestDescriptor {
        RequestDescriptor::get(format!("{}tests/{}/matches?page={}", self.base, guid, page))
    }

    /// One page of the matches shared between a test and one match.
    pub fn matches_in_common_page(&self, guid: &str, match_guid: &str, page: u32) -> RequestDescriptor {
        RequestDescriptor::get(format!(
            "{}tests/{}/matchesInCommon?matchTestGuid={}&page={}",
            self.base, guid, match_guid, page
        ))
    }

    /// Segment and cluster details for one match.
    pub fn match_info(&self, guid: &str, match_guid: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("{}tests/{}/matches/{}", self.base, guid, match_guid))
    }

    /// Ethnicity composition for one match.
    pub fn match_ethnicity(&self, guid: &str, match_guid: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!(
            "{}tests/{}/matches/{}/ethnicity",
            self.base, guid, match_guid
        ))
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new()
    }
}
