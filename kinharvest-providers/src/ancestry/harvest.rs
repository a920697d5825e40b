//! AncestryDNA harvest driver.
//!
//! Walks the account: the test listing, then per test the subject info,
//! parent links, and the paged match listing. With the extended flag each
//! match row is enriched serially with ethnicity, segment details, and the
//! shared-match list, from which the paternal/maternal side flags are
//! derived.

use kinharvest_core::{Record, Table, MISSING};
use kinharvest_fetch::{FetchError, PageCollector, PerformRequest};
use tracing::{info, instrument, warn};

use super::endpoints::Endpoints;
use super::parser::{self, Parents, TestInfo};

// ============================================================================
// Harvest Output
// ============================================================================

/// Everything harvested from one account.
#[derive(Debug)]
pub struct AncestryHarvest {
    /// Tests handled by the account.
    pub tests: Table,
    /// Administrator account id of the first test, the default output
    /// prefix.
    pub default_prefix: Option<String>,
    /// Per-test match tables, in listing order.
    pub per_test: Vec<TestHarvest>,
}

/// Match table harvested for one test.
#[derive(Debug)]
pub struct TestHarvest {
    /// The test this table belongs to.
    pub guid: String,
    /// Matches of the test, the subject's own row first.
    pub matches: Table,
}

// ============================================================================
// Harvester
// ============================================================================

/// Drives a full AncestryDNA account harvest over a perform seam.
pub struct AncestryHarvester<'a> {
    session: &'a dyn PerformRequest,
    endpoints: Endpoints,
}

impl<'a> AncestryHarvester<'a> {
    /// Creates a harvester over the default API prefix.
    pub fn new(session: &'a dyn PerformRequest) -> Self {
        Self::with_endpoints(session, Endpoints::new())
    }

    /// Creates a harvester over custom endpoint builders.
    pub fn with_endpoints(session: &'a dyn PerformRequest, endpoints: Endpoints) -> Self {
        Self { session, endpoints }
    }

    /// Harvests the whole account. `extended` adds the per-match
    /// enrichment pass.
    #[instrument(skip(self))]
    pub async fn harvest(&self, extended: bool) -> Result<AncestryHarvest, FetchError> {
        let body = self.session.perform(&self.endpoints.tests()).await?;
        let tests = parser::parse_tests(&body)?;

        let default_prefix = tests
            .data
            .complete_tests
            .first()
            .and_then(|test| test.test_admin_ucdm_id.clone());

        let mut per_test = Vec::new();
        for test in &tests.data.complete_tests {
            let matches = self.harvest_test(&test.guid, extended).await?;
            per_test.push(TestHarvest {
                guid: test.guid.clone(),
                matches,
            });
        }

        Ok(AncestryHarvest {
            tests: parser::tests_table(&tests),
            default_prefix,
            per_test,
        })
    }

    #[instrument(skip(self))]
    async fn harvest_test(&self, guid: &str, extended: bool) -> Result<Table, FetchError> {
        let body = self.session.perform(&self.endpoints.parents(guid)).await?;
        let parents = parser::parse_parents(&body)?;

        let body = self.session.perform(&self.endpoints.test_info(guid)).await?;
        let test_info = parser::parse_test_info(&body)?;

        let rows = PageCollector::new(self.session)
            .collect_all(
                |page| self.endpoints.matches_page(guid, page),
                parser::parse_matches_page,
                None,
            )
            .await?;
        info!(guid, count = rows.len(), "Downloading DNA matches");

        let mut table = Table::with_columns(parser::MATCH_COLUMNS.iter().copied());
        table.push_extending(self.subject_row(guid, &test_info, extended));

        for row in &rows {
            let mut record = parser::match_record(row);
            if extended {
                if let Some(match_guid) = parser::match_guid(row) {
                    self.enrich_match(guid, match_guid, &parents, &mut record)
                        .await?;
                }
            }
            table.push_extending(record);
        }

        Ok(table)
    }

    /// The subject's own row, mirroring how the portal would list it: zero
    /// meioses, an admin subject, and (for extended harvests) both sides.
    fn subject_row(&self, guid: &str, test_info: &TestInfo, extended: bool) -> Record {
        let mut record = Record::new();
        record.set("testGuid", guid);
        record.set("matchTestDisplayName", test_info.display_name());
        if let Some(gender) = &test_info.gender {
            record.set("subjectGender", gender);
        }
        record.set("meiosisValue", "0");
        record.set("hasHint", "true");
        record.set("matchTestSubjectIsAdmin", "true");
        if extended {
            record.set("patside", "true");
            record.set("matside", "true");
        }
        record
    }

    /// Enriches one match row with ethnicity, segment details, and the
    /// shared-match list. A denial on any of these costs this row's
    /// enrichment, not the harvest.
    async fn enrich_match(
        &self,
        guid: &str,
        match_guid: &str,
        parents: &Parents,
        record: &mut Record,
    ) -> Result<(), FetchError> {
        let ethnicity = self
            .fetch_optional(&self.endpoints.match_ethnicity(guid, match_guid))
            .await?;
        if let Some(body) = ethnicity {
            for (region, cell) in parser::parse_ethnicity(&body)? {
                record.set(region, cell);
            }
        }

        let match_info = self
            .fetch_optional(&self.endpoints.match_info(guid, match_guid))
            .await?;
        if let Some(body) = match_info {
            let info = parser::parse_match_info(&body)?;
            record.set("cadGroups", info.cad_groups_cell());
            record.set("sharedSegments", info.shared_segments_cell());
        }

        let shared = PageCollector::new(self.session)
            .collect_all(
                |page| self.endpoints.matches_in_common_page(guid, match_guid, page),
                parser::parse_matches_page,
                None,
            )
            .await;
        let shared = match shared {
            Ok(rows) => rows,
            Err(error) if error.is_per_resource() => {
                warn!(match_guid, %error, "Shared matches denied for match");
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let shared_guids: Vec<String> = shared
            .iter()
            .filter_map(|row| parser::match_guid(row).map(str::to_string))
            .collect();

        let on_side = |side: Option<&str>| {
            side.is_some_and(|parent| shared_guids.iter().any(|g| g == parent))
                .to_string()
        };
        record.set("patside", on_side(parents.father_guid()));
        record.set("matside", on_side(parents.mother_guid()));
        record.set(
            "matchesInCommon",
            if shared_guids.is_empty() {
                MISSING.to_string()
            } else {
                shared_guids.join(",")
            },
        );

        Ok(())
    }

    async fn fetch_optional(
        &self,
        descriptor: &kinharvest_core::RequestDescriptor,
    ) -> Result<Option<String>, FetchError> {
        match self.session.perform(descriptor).await {
            Ok(body) => Ok(Some(body)),
            Err(error) if error.is_per_resource() => {
                warn!(url = %descriptor.url, %error, "Match detail denied");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kinharvest_core::RequestDescriptor;
    use std::sync::Mutex as StdMutex;

    struct CannedPortal {
        urls: StdMutex<Vec<String>>,
    }

    impl CannedPortal {
        fn new() -> Self {
            Self {
                urls: StdMutex::new(Vec::new()),
            }
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PerformRequest for CannedPortal {
        async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
            let url = &descriptor.url;
            self.urls.lock().unwrap().push(url.clone());

            if url.ends_with("/tests") {
                return Ok(concat!(
                    r#"{"data":{"completeTests":[{"guid":"g1","testAdminUcdmId":"admin1","#,
                    r#""testSubject":{"givenNames":"Ada","surname":"L","gender":"Female"}}]}}"#
                )
                .to_string());
            }
            if url.contains("/parents") {
                return Ok(r#"{"father":{"testGuid":"pf"},"mother":{"testGuid":"pm"}}"#.to_string());
            }
            if url.contains("/testInfo") {
                return Ok(r#"{"givenNames":"Ada","surname":"L","gender":"Female"}"#.to_string());
            }
            if url.contains("matchesInCommon") {
                if url.ends_with("page=1") {
                    return Ok(r#"{"matchGroups":[{"matches":[{"testGuid":"pf"}]}]}"#.to_string());
                }
                return Ok(r#"{"matchGroups":[]}"#.to_string());
            }
            if url.contains("/matches?page=1") {
                return Ok(concat!(
                    r#"{"matchGroups":[{"matches":["#,
                    r#"{"testGuid":"m1","sharedCentimorgans":42.5,"hasHint":false}]}]}"#
                )
                .to_string());
            }
            if url.contains("/matches?page=") {
                return Ok(r#"{"matchGroups":[]}"#.to_string());
            }
            if url.contains("/ethnicity") {
                return Ok(r#"{"europe":["Ireland"]}"#.to_string());
            }
            if url.contains("/matches/m1") {
                return Ok(r#"{"cadGroups":["c1"],"sharedSegments":7}"#.to_string());
            }
            panic!("unexpected url: {}", url);
        }
    }

    #[tokio::test]
    async fn test_basic_harvest_builds_subject_and_match_rows() {
        let portal = CannedPortal::new();
        let harvester = AncestryHarvester::new(&portal);

        let harvest = harvester.harvest(false).await.unwrap();

        assert_eq!(harvest.default_prefix.as_deref(), Some("admin1"));
        assert_eq!(harvest.tests.cell(0, "givenNames"), "Ada");
        assert_eq!(harvest.per_test.len(), 1);

        let matches = &harvest.per_test[0].matches;
        assert_eq!(matches.len(), 2);
        // The subject's own row comes first.
        assert_eq!(matches.cell(0, "testGuid"), "g1");
        assert_eq!(matches.cell(0, "matchTestDisplayName"), "Ada L");
        assert_eq!(matches.cell(0, "meiosisValue"), "0");
        assert_eq!(matches.cell(1, "testGuid"), "m1");
        assert_eq!(matches.cell(1, "sharedCentimorgans"), "42.5");

        // No enrichment traffic without the extended flag.
        assert!(portal
            .urls()
            .iter()
            .all(|u| !u.contains("ethnicity") && !u.contains("matchesInCommon")));
    }

    #[tokio::test]
    async fn test_extended_harvest_enriches_matches() {
        let portal = CannedPortal::new();
        let harvester = AncestryHarvester::new(&portal);

        let harvest = harvester.harvest(true).await.unwrap();
        let matches = &harvest.per_test[0].matches;

        assert_eq!(matches.cell(0, "patside"), "true");
        assert_eq!(matches.cell(1, "europe"), "Ireland");
        assert_eq!(matches.cell(1, "cadGroups"), r#"["c1"]"#);
        assert_eq!(matches.cell(1, "sharedSegments"), "7");
        // The father's test is in the shared list, the mother's is not.
        assert_eq!(matches.cell(1, "patside"), "true");
        assert_eq!(matches.cell(1, "matside"), "false");
        assert_eq!(matches.cell(1, "matchesInCommon"), "pf");
    }

    #[tokio::test]
    async fn test_denied_enrichment_keeps_base_row() {
        struct DenyingPortal {
            inner: CannedPortal,
        }

        #[async_trait]
        impl PerformRequest for DenyingPortal {
            async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
                if descriptor.url.contains("/ethnicity") {
                    return Err(FetchError::Forbidden {
                        url: descriptor.url.clone(),
                    });
                }
                self.inner.perform(descriptor).await
            }
        }

        let portal = DenyingPortal {
            inner: CannedPortal::new(),
        };
        let harvester = AncestryHarvester::new(&portal);

        let harvest = harvester.harvest(true).await.unwrap();
        let matches = &harvest.per_test[0].matches;

        assert_eq!(matches.cell(1, "europe"), MISSING);
        assert_eq!(matches.cell(1, "testGuid"), "m1");
        assert_eq!(matches.cell(1, "matchesInCommon"), "pf");
    }

    #[tokio::test]
    async fn test_match_paging_stops_on_empty_groups() {
        let portal = CannedPortal::new();
        let harvester = AncestryHarvester::new(&portal);

        harvester.harvest(false).await.unwrap();

        let match_pages = portal
            .urls()
            .iter()
            .filter(|u| u.contains("/matches?page="))
            .count();
        assert_eq!(match_pages, 2);
    }
}
