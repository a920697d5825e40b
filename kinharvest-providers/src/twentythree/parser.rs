//! 23andMe response models and parsers.

use std::collections::HashSet;
use std::sync::LazyLock;

use kinharvest_core::{record_from_object, Record, Table};
use kinharvest_fetch::{token, FetchError, TokenKind};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static INDENTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("static regex"));

/// Undoes the HTML entity escaping the account page applies to its inline
/// JSON. Only the entities the page actually emits are handled.
fn unescape_html(body: &str) -> String {
    body.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ============================================================================
// Account Profiles
// ============================================================================

/// One managed profile reachable from the account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountProfile {
    /// Profile identifier (ehid).
    pub id: String,
    /// Reported sex, when present.
    #[serde(default)]
    pub sex: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Extracts the profile list embedded in the account page HTML.
pub fn parse_account_profiles(html: &str) -> Result<Vec<AccountProfile>, FetchError> {
    // The inline JSON is split across indented lines and entity-escaped.
    let collapsed = INDENTATION.replace_all(html, "");
    let unescaped = unescape_html(&collapsed);
    let json = token::extract(&unescaped, TokenKind::ProfileJson)?;
    Ok(serde_json::from_str(&json)?)
}

/// Renders the profile list as the account table.
pub fn account_profiles_table(profiles: &[AccountProfile]) -> Table {
    let mut table = Table::with_columns(["id", "sex", "first_name", "last_name"]);
    for profile in profiles {
        let mut record = Record::new();
        record.set("id", &profile.id);
        if let Some(sex) = &profile.sex {
            record.set("sex", sex);
        }
        if let Some(name) = &profile.first_name {
            record.set("first_name", name);
        }
        if let Some(name) = &profile.last_name {
            record.set("last_name", name);
        }
        table.push(record);
    }
    table
}

// ============================================================================
// Connections
// ============================================================================

/// Sharing connections of the account.
#[derive(Debug, Deserialize)]
pub struct ConnectionsResponse {
    /// Raw connection rows.
    pub data: Vec<serde_json::Map<String, Value>>,
}

/// Parses the connections listing.
pub fn parse_connections(body: &str) -> Result<ConnectionsResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

impl ConnectionsResponse {
    /// Returns the profile ids of all connections.
    pub fn profile_ids(&self) -> HashSet<String> {
        self.data
            .iter()
            .filter_map(|row| row.get("profile_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Renders the raw rows as a table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::default();
        for row in &self.data {
            table.push_extending(record_from_object(row));
        }
        table
    }
}

// ============================================================================
// DNA Profiles
// ============================================================================

/// DNA profile listing for the active profile.
#[derive(Debug, Deserialize)]
pub struct DnaProfilesResponse {
    /// Raw profile rows.
    pub profiles: Vec<serde_json::Map<String, Value>>,
}

/// Parses the DNA profile listing.
pub fn parse_dna_profiles(body: &str) -> Result<DnaProfilesResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

impl DnaProfilesResponse {
    /// Renders the raw rows as a table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::default();
        for row in &self.profiles {
            table.push_extending(record_from_object(row));
        }
        table
    }
}

// ============================================================================
// Relatives
// ============================================================================

/// Relatives listing for the active profile.
#[derive(Debug, Deserialize)]
pub struct RelativesResponse {
    /// Matched relatives.
    pub relatives: Vec<Relative>,
}

/// One matched relative.
#[derive(Debug, Deserialize)]
pub struct Relative {
    /// Identifier used for relatives-in-common lookups.
    #[serde(default)]
    pub match_id: Option<String>,
    /// Identifier used for pairwise IBD lookups.
    #[serde(default)]
    pub human_id: Option<String>,
    /// Sharing status with this relative.
    #[serde(default)]
    pub new_share_status: Option<String>,
    /// Everything else the vendor reports for the relative.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl Relative {
    /// Returns true when the relative's data is shared and per-pair
    /// lookups are worth issuing.
    pub fn is_sharing(&self) -> bool {
        !matches!(
            self.new_share_status.as_deref(),
            Some("NONE" | "PRE_YOUDOT_ANON" | "PRE_YOUDOT_PUBLIC")
        )
    }

    /// Renders the full relative as a record.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        if let Some(id) = &self.match_id {
            record.set("match_id", id);
        }
        if let Some(id) = &self.human_id {
            record.set("human_id", id);
        }
        if let Some(status) = &self.new_share_status {
            record.set("new_share_status", status);
        }
        for (key, value) in &self.rest {
            record.set_json(key.clone(), value);
        }
        record
    }
}

/// Parses the relatives listing.
pub fn parse_relatives(body: &str) -> Result<RelativesResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Renders a relatives listing as a table.
pub fn relatives_table(relatives: &RelativesResponse) -> Table {
    let mut table = Table::default();
    for relative in &relatives.relatives {
        table.push_extending(relative.to_record());
    }
    table
}

// ============================================================================
// Relatives In Common
// ============================================================================

/// Relatives shared between the active profile and one match.
#[derive(Debug, Deserialize)]
pub struct RelativesInCommonResponse {
    /// Shared relative rows.
    pub relatives_in_common: Vec<RelativeInCommon>,
}

/// One shared relative row.
#[derive(Debug, Deserialize)]
pub struct RelativeInCommon {
    /// The querying profile's id.
    #[serde(default)]
    pub local_ehid: Option<String>,
    /// The shared relative's owner.
    #[serde(default)]
    pub owner_ehid: Option<String>,
    /// The remote match's id.
    #[serde(default)]
    pub remote_ehid: Option<String>,
    /// Whether the owner shares openly.
    #[serde(default)]
    pub is_open_sharing: bool,
}

/// Parses a relatives-in-common response.
pub fn parse_relatives_in_common(body: &str) -> Result<RelativesInCommonResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

// ============================================================================
// IBD
// ============================================================================

/// An unordered id pair, normalized so (a, b) and (b, a) collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IbdPair {
    /// Lexicographically smaller id.
    pub first: String,
    /// Lexicographically larger id.
    pub second: String,
}

impl IbdPair {
    /// Creates a normalized pair.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

/// Parses the IBD segment list for one pair.
pub fn parse_ibd(body: &str) -> Result<Vec<serde_json::Map<String, Value>>, FetchError> {
    Ok(serde_json::from_str(body)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_profiles_from_html() {
        // Inline JSON split across indented lines and entity-escaped, the
        // way the account page serves it.
        let html = concat!(
            "<script>\n",
            "    new exports.quickInviteModal([{&quot;id&quot;:&quot;e111&quot;,\n",
            "    &quot;sex&quot;:&quot;F&quot;,&quot;first_name&quot;:&quot;Ada&quot;,\n",
            "    &quot;last_name&quot;:&quot;L&quot;}],\n",
            "    &quot;0123456789abcdef&quot;);new exports.next();\n",
            "</script>"
        );

        let profiles = parse_account_profiles(html).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "e111");
        assert_eq!(profiles[0].first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_sharing_status_filter() {
        let sharing: Relative = serde_json::from_str(
            r#"{"match_id":"m1","human_id":"h1","new_share_status":"ACCEPTED"}"#,
        )
        .unwrap();
        let hidden: Relative = serde_json::from_str(
            r#"{"match_id":"m2","human_id":"h2","new_share_status":"NONE"}"#,
        )
        .unwrap();
        let anon: Relative = serde_json::from_str(
            r#"{"match_id":"m3","human_id":"h3","new_share_status":"PRE_YOUDOT_ANON"}"#,
        )
        .unwrap();

        assert!(sharing.is_sharing());
        assert!(!hidden.is_sharing());
        assert!(!anon.is_sharing());
    }

    #[test]
    fn test_relative_record_keeps_extra_fields() {
        let relative: Relative = serde_json::from_str(
            r#"{"match_id":"m1","human_id":"h1","new_share_status":"ACCEPTED",
                "predicted_relationship":"2nd Cousin","ibd_half_cm":123.4}"#,
        )
        .unwrap();

        let record = relative.to_record();
        assert_eq!(record.get("match_id"), Some("m1"));
        assert_eq!(record.get("predicted_relationship"), Some("2nd Cousin"));
        assert_eq!(record.get("ibd_half_cm"), Some("123.4"));
    }

    #[test]
    fn test_connections_profile_ids() {
        let response = parse_connections(
            r#"{"data":[{"profile_id":"c1","name":"X"},{"profile_id":"c2"},{"name":"no id"}]}"#,
        )
        .unwrap();

        let ids = response.profile_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("c1") && ids.contains("c2"));
        assert_eq!(response.to_table().len(), 3);
    }

    #[test]
    fn test_ibd_pair_normalization() {
        assert_eq!(IbdPair::new("b", "a"), IbdPair::new("a", "b"));
        let pair = IbdPair::new("b", "a");
        assert_eq!(pair.first, "a");
        assert_eq!(pair.second, "b");
    }

    #[test]
    fn test_parse_ibd_segments() {
        let segments =
            parse_ibd(r#"[{"chromosome":"1","start":100,"end":200},{"chromosome":"X"}]"#).unwrap();
        assert_eq!(segments.len(), 2);
    }
}
