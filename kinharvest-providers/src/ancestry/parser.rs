//! AncestryDNA response models and parsers.

use kinharvest_core::{record_from_object, Record, Table, MISSING};
use kinharvest_fetch::FetchError;
use serde::Deserialize;
use serde_json::Value;

/// Column order of the per-test match table, as the portal reports match
/// fields. Extended harvests append further columns past these.
pub const MATCH_COLUMNS: &[&str] = &[
    "dnaMatch",
    "lastLoggedInDate",
    "megaBases",
    "ignored",
    "testGuid",
    "hasHint",
    "starred",
    "matchTreeId",
    "matchTreeNodeCount",
    "matchTestAdminDisplayName",
    "hasNote",
    "userPhoto",
    "sharedCentimorgans",
    "matchTreeDisplayName",
    "matchTestDisplayName",
    "matchTreeIsPrivate",
    "meiosisValue",
    "matchTestSubjectIsAdmin",
    "note",
    "subjectGender",
    "viewed",
    "confidence",
    "relativeDate",
    "sharedSegments",
    "hideManagedByInfo",
];

// ============================================================================
// Tests Listing
// ============================================================================

/// Tests handled by the account.
#[derive(Debug, Deserialize)]
pub struct TestsResponse {
    /// Response payload.
    pub data: TestsData,
}

/// Payload of the tests listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestsData {
    /// Tests with completed processing.
    pub complete_tests: Vec<CompleteTest>,
}

/// One completed test.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTest {
    /// Test identifier used by every per-test endpoint.
    pub guid: String,
    /// Account id of the test administrator, used as the default output
    /// prefix.
    #[serde(default)]
    pub test_admin_ucdm_id: Option<String>,
    /// Subject fields, flattened into the test row.
    #[serde(default)]
    pub test_subject: Option<serde_json::Map<String, Value>>,
    /// Everything else the portal reports for the test.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl CompleteTest {
    /// Renders the test as a flat record, subject fields inlined.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.set("guid", &self.guid);
        if let Some(id) = &self.test_admin_ucdm_id {
            record.set("testAdminUcdmId", id);
        }
        for (key, value) in &self.rest {
            record.set_json(key.clone(), value);
        }
        if let Some(subject) = &self.test_subject {
            for (key, value) in subject {
                record.set_json(key.clone(), value);
            }
        }
        record
    }
}

/// Parses the tests listing.
pub fn parse_tests(body: &str) -> Result<TestsResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Renders the tests listing as a table.
pub fn tests_table(tests: &TestsResponse) -> Table {
    let mut table = Table::default();
    for test in &tests.data.complete_tests {
        table.push_extending(test.to_record());
    }
    table
}

// ============================================================================
// Test Info and Parents
// ============================================================================

/// Subject details for one test.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    /// Subject given names.
    #[serde(default)]
    pub given_names: Option<String>,
    /// Subject surname.
    #[serde(default)]
    pub surname: Option<String>,
    /// Subject gender.
    #[serde(default)]
    pub gender: Option<String>,
}

impl TestInfo {
    /// Full display name of the subject.
    pub fn display_name(&self) -> String {
        match (&self.given_names, &self.surname) {
            (Some(given), Some(sur)) => format!("{} {}", given, sur),
            (Some(given), None) => given.clone(),
            (None, Some(sur)) => sur.clone(),
            (None, None) => MISSING.to_string(),
        }
    }
}

/// Parses the test-info response.
pub fn parse_test_info(body: &str) -> Result<TestInfo, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Parent test links for one test.
#[derive(Debug, Default, Deserialize)]
pub struct Parents {
    /// Paternal test, when linked.
    #[serde(default)]
    pub father: Option<ParentRef>,
    /// Maternal test, when linked.
    #[serde(default)]
    pub mother: Option<ParentRef>,
}

/// Link to a parent's test.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// Guid of the parent's test.
    #[serde(default)]
    pub test_guid: Option<String>,
}

impl Parents {
    fn side_guid(parent: &Option<ParentRef>) -> Option<&str> {
        parent.as_ref().and_then(|p| p.test_guid.as_deref())
    }

    /// Guid of the paternal test, when linked.
    pub fn father_guid(&self) -> Option<&str> {
        Self::side_guid(&self.father)
    }

    /// Guid of the maternal test, when linked.
    pub fn mother_guid(&self) -> Option<&str> {
        Self::side_guid(&self.mother)
    }
}

/// Parses the parents response.
pub fn parse_parents(body: &str) -> Result<Parents, FetchError> {
    Ok(serde_json::from_str(body)?)
}

// ============================================================================
// Match Pages
// ============================================================================

/// One page of a match listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesPage {
    /// Match groups on this page; an empty list marks the end.
    pub match_groups: Vec<MatchGroup>,
}

/// One relationship-distance group of matches.
#[derive(Debug, Deserialize)]
pub struct MatchGroup {
    /// Raw match rows.
    pub matches: Vec<serde_json::Map<String, Value>>,
}

/// Parses one match page, flattening groups into a row list. An empty
/// result means the listing is exhausted.
pub fn parse_matches_page(body: &str) -> Result<Vec<serde_json::Map<String, Value>>, FetchError> {
    let page: MatchesPage = serde_json::from_str(body)?;
    Ok(page
        .match_groups
        .into_iter()
        .flat_map(|group| group.matches)
        .collect())
}

/// Returns the `testGuid` of a raw match row.
pub fn match_guid(row: &serde_json::Map<String, Value>) -> Option<&str> {
    row.get("testGuid").and_then(Value::as_str)
}

/// Renders a raw match row as a record.
pub fn match_record(row: &serde_json::Map<String, Value>) -> Record {
    record_from_object(row)
}

// ============================================================================
// Extended Match Details
// ============================================================================

/// Segment and cluster details for one match.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    /// Clustered-association groups, vendor-shaped.
    #[serde(default)]
    pub cad_groups: Option<Value>,
    /// Shared segment count.
    #[serde(default)]
    pub shared_segments: Option<Value>,
}

impl MatchInfo {
    /// Renders the cluster groups as a cell, or the missing marker.
    pub fn cad_groups_cell(&self) -> String {
        match &self.cad_groups {
            Some(value) if !is_json_empty(value) => value.to_string(),
            _ => MISSING.to_string(),
        }
    }

    /// Renders the segment count as a cell, zero when absent.
    pub fn shared_segments_cell(&self) -> String {
        match &self.shared_segments {
            Some(value) if !is_json_empty(value) => value.to_string(),
            _ => "0".to_string(),
        }
    }
}

fn is_json_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Parses the match-info response.
pub fn parse_match_info(body: &str) -> Result<MatchInfo, FetchError> {
    Ok(serde_json::from_str(body)?)
}

/// Parses an ethnicity response into (region, cell) pairs; each region's
/// population list is comma-joined, empty lists render as the missing
/// marker. An empty body means no composition is available.
pub fn parse_ethnicity(body: &str) -> Result<Vec<(String, String)>, FetchError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let regions: serde_json::Map<String, Value> = serde_json::from_str(body)?;
    Ok(regions
        .into_iter()
        .map(|(region, value)| {
            let populations: Vec<&str> = value
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let cell = if populations.is_empty() {
                MISSING.to_string()
            } else {
                populations.join(",")
            };
            (region, cell)
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
