//! 23andMe endpoint descriptors and session configuration.

use std::time::Duration;

use kinharvest_core::{ProfileId, RequestDescriptor};
use kinharvest_fetch::{LoginFlow, RetryPolicy, SessionConfig};

use super::parser::IbdPair;

/// Login page, both the token source and the credential sink.
pub const LOGIN_URL: &str = "https://auth.23andme.com/login/";

/// Account landing page carrying the embedded profile list.
pub const ACCOUNT_URL: &str = "https://www.23andme.com/you/";

const YOU_BASE: &str = "https://you.23andme.com";

/// Body of the vendor's rate-limit soft block, served with HTTP 200.
const SOFT_BLOCK_BODY: &str = "191919";

/// Returns the CSRF two-step login flow for this vendor.
pub fn login_flow() -> LoginFlow {
    LoginFlow::CsrfForm {
        login_url: LOGIN_URL.to_string(),
        token_field: "csrfmiddlewaretoken".to_string(),
        csrf_cookie: "csrftoken".to_string(),
        session_cookie: "sessionid".to_string(),
    }
}

/// Builds the session configuration with the given fixed timeout/delay.
pub fn session_config(timeout: Duration) -> SessionConfig {
    SessionConfig {
        flow: login_flow(),
        policy: RetryPolicy::new(timeout),
        soft_block: Some(is_soft_block),
    }
}

/// Recognizes the vendor busy signal inside an HTTP-200 body.
pub fn is_soft_block(body: &str) -> bool {
    body.trim() == SOFT_BLOCK_BODY
}

/// Account page with the embedded profile list.
pub fn account_page() -> RequestDescriptor {
    RequestDescriptor::get(ACCOUNT_URL)
}

/// Sharing connections for the whole account.
pub fn connections(limit: u32, offset: u32) -> RequestDescriptor {
    RequestDescriptor::get(format!(
        "{}/tools/your-connections/connection/?limit={}&offset={}",
        YOU_BASE, limit, offset
    ))
    .with_xhr()
}

/// Server-side active-profile switch.
pub fn switch_profile(profile: &ProfileId) -> RequestDescriptor {
    RequestDescriptor::get(format!("{}/switch-profile/?profile-id={}", YOU_BASE, profile))
}

/// DNA profile list for the active profile.
pub fn dna_profiles(profile: &ProfileId) -> RequestDescriptor {
    RequestDescriptor::get(format!(
        "{}/tools/relatives/dna/ajax/?limit=1000&offset=0",
        YOU_BASE
    ))
    .scoped_to(profile.clone())
}

/// Relatives list for the active profile.
pub fn relatives(profile: &ProfileId) -> RequestDescriptor {
    RequestDescriptor::get(format!(
        "{}/tools/relatives/ajax/?limit=2000&offset=0",
        YOU_BASE
    ))
    .scoped_to(profile.clone())
}

/// Aggregate relatives CSV download for the active profile.
pub fn aggregate(profile: &ProfileId) -> RequestDescriptor {
    RequestDescriptor::get(format!("{}/tools/relatives/download/", YOU_BASE))
        .scoped_to(profile.clone())
}

/// Relatives shared with one match, for the active profile.
pub fn relatives_in_common(profile: &ProfileId, match_id: &str) -> RequestDescriptor {
    RequestDescriptor::get(format!(
        "{}/tools/compare/match/relatives_in_common/?remote_id={}&limit=1000&offset=0",
        YOU_BASE, match_id
    ))
    .scoped_to(profile.clone())
}

/// Pairwise IBD segments for a normalized id pair. Not profile-scoped.
pub fn ibd(pair: &IbdPair) -> RequestDescriptor {
    RequestDescriptor::get(format!(
        "{}/tools/ibd/?human_id_1={}&human_id_2={}",
        YOU_BASE, pair.first, pair.second
    ))
}
