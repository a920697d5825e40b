//! 23andMe harvest driver.
//!
//! Walks the account: profile list, connections, then per managed profile
//! (switching server-side scope as it goes) the DNA profiles, aggregate
//! CSV, and relatives. With the extended flag it fans out
//! relatives-in-common per sharing match, accumulates the normalized id
//! pair set, and finishes with a pairwise IBD batch over every pair.

use std::collections::HashSet;

use kinharvest_core::{record_from_object, ProfileId, Table};
use kinharvest_fetch::{
    BatchFetcher, FetchError, PerformRequest, ProfileContext, ProfileScopedSession,
};
use tracing::{info, instrument, warn};

use super::endpoints;
use super::parser::{self, IbdPair, RelativesResponse};

/// Listing window sizes the portal accepts.
const CONNECTIONS_LIMIT: u32 = 1000;

// ============================================================================
// Harvest Output
// ============================================================================

/// Everything harvested from one account.
#[derive(Debug)]
pub struct AccountHarvest {
    /// Managed profiles of the account.
    pub profiles: Table,
    /// Sharing connections of the account.
    pub connections: Table,
    /// Per-profile harvests, in account order.
    pub per_profile: Vec<ProfileHarvest>,
    /// Pairwise IBD segments; present only for extended harvests.
    pub ibd: Option<Table>,
}

/// Data harvested for one managed profile.
#[derive(Debug)]
pub struct ProfileHarvest {
    /// The profile this belongs to.
    pub profile: ProfileId,
    /// DNA profile listing.
    pub dna_profiles: Table,
    /// Aggregate relatives CSV, verbatim as served.
    pub aggregate_csv: String,
    /// Relatives listing; `None` when the portal denies it for this
    /// profile.
    pub relatives: Option<Table>,
}

// ============================================================================
// Harvester
// ============================================================================

/// Drives a full 23andMe account harvest over a perform seam.
pub struct TwentyThreeHarvester<'a> {
    session: &'a dyn PerformRequest,
    profiles: ProfileContext,
    batch: BatchFetcher,
}

impl<'a> TwentyThreeHarvester<'a> {
    /// Creates a harvester with the given batch parallelism.
    pub fn new(session: &'a dyn PerformRequest, parallelism: usize) -> Self {
        Self {
            session,
            profiles: ProfileContext::new(endpoints::switch_profile),
            batch: BatchFetcher::new(parallelism),
        }
    }

    /// Harvests the whole account. `extended` adds the per-pair IBD fan-out.
    #[instrument(skip(self))]
    pub async fn harvest(&self, extended: bool) -> Result<AccountHarvest, FetchError> {
        let body = self.session.perform(&endpoints::account_page()).await?;
        let account_profiles = parser::parse_account_profiles(&body)?;
        let profiles_table = parser::account_profiles_table(&account_profiles);

        let body = self
            .session
            .perform(&endpoints::connections(CONNECTIONS_LIMIT, 0))
            .await?;
        let connections = parser::parse_connections(&body)?;
        let connection_ids = connections.profile_ids();
        let connections_table = connections.to_table();

        let scoped = ProfileScopedSession::new(self.session, &self.profiles);
        let mut per_profile = Vec::new();
        let mut pairs: HashSet<IbdPair> = HashSet::new();

        for account_profile in &account_profiles {
            let profile = ProfileId::new(&account_profile.id);
            let harvested = self
                .harvest_profile(&scoped, &profile, extended, &connection_ids, &mut pairs)
                .await?;
            per_profile.push(harvested);
        }

        let ibd = if extended {
            Some(self.harvest_ibd(pairs).await)
        } else {
            None
        };

        Ok(AccountHarvest {
            profiles: profiles_table,
            connections: connections_table,
            per_profile,
            ibd,
        })
    }

    #[instrument(skip(self, scoped, connection_ids, pairs), fields(profile = %profile))]
    async fn harvest_profile(
        &self,
        scoped: &ProfileScopedSession<'_>,
        profile: &ProfileId,
        extended: bool,
        connection_ids: &HashSet<String>,
        pairs: &mut HashSet<IbdPair>,
    ) -> Result<ProfileHarvest, FetchError> {
        let body = scoped.perform(&endpoints::dna_profiles(profile)).await?;
        let dna_profiles = parser::parse_dna_profiles(&body)?.to_table();

        let aggregate_csv = scoped.perform(&endpoints::aggregate(profile)).await?;

        // The portal denies relatives for some profiles; that costs this
        // one table, not the rest of the account.
        let relatives = match scoped.perform(&endpoints::relatives(profile)).await {
            Ok(body) => Some(parser::parse_relatives(&body)?),
            Err(error) if error.is_per_resource() => {
                warn!(profile = %profile, %error, "Relatives denied for profile");
                None
            }
            Err(error) => return Err(error),
        };

        if extended {
            if let Some(relatives) = &relatives {
                self.collect_pairs(scoped, profile, relatives, connection_ids, pairs)
                    .await;
            }
        }

        Ok(ProfileHarvest {
            profile: profile.clone(),
            dna_profiles,
            aggregate_csv,
            relatives: relatives.as_ref().map(parser::relatives_table),
        })
    }

    /// Fans out relatives-in-common for every sharing match and folds the
    /// resulting id pairs into `pairs`. Per-match failures are recorded
    /// and skipped; a best-effort pair set is the point.
    async fn collect_pairs(
        &self,
        scoped: &ProfileScopedSession<'_>,
        profile: &ProfileId,
        relatives: &RelativesResponse,
        connection_ids: &HashSet<String>,
        pairs: &mut HashSet<IbdPair>,
    ) {
        let sharing: Vec<_> = relatives
            .relatives
            .iter()
            .filter(|r| r.is_sharing())
            .collect();
        info!(count = sharing.len(), "Downloading DNA matches");

        for relative in &sharing {
            if let Some(human_id) = &relative.human_id {
                pairs.insert(IbdPair::new(profile.as_str(), human_id.as_str()));
            }
        }

        let match_ids: Vec<String> = sharing.iter().filter_map(|r| r.match_id.clone()).collect();
        let result = self
            .batch
            .fetch_all(
                scoped,
                match_ids,
                |match_id| endpoints::relatives_in_common(profile, match_id),
                parser::parse_relatives_in_common,
            )
            .await;

        for (_, response) in result.successes() {
            for row in &response.relatives_in_common {
                let owner_connected = row
                    .owner_ehid
                    .as_deref()
                    .is_some_and(|owner| connection_ids.contains(owner));
                if !(row.is_open_sharing || owner_connected) {
                    continue;
                }

                let ids = [&row.local_ehid, &row.owner_ehid, &row.remote_ehid];
                for (a, b) in [(0, 1), (0, 2), (1, 2)] {
                    if let (Some(a), Some(b)) = (ids[a], ids[b]) {
                        if !a.is_empty() && !b.is_empty() {
                            pairs.insert(IbdPair::new(a.as_str(), b.as_str()));
                        }
                    }
                }
            }
        }
    }

    /// Fetches pairwise IBD segments for the whole pair set and flattens
    /// them into one table, in pair order.
    async fn harvest_ibd(&self, pairs: HashSet<IbdPair>) -> Table {
        info!(count = pairs.len(), "Downloading IBD matches");

        let mut keys: Vec<IbdPair> = pairs.into_iter().collect();
        keys.sort();

        let result = self
            .batch
            .fetch_all(self.session, keys, endpoints::ibd, parser::parse_ibd)
            .await;

        let mut outcomes: Vec<_> = result.into_outcomes().collect();
        outcomes.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut table = Table::default();
        for (_, outcome) in outcomes {
            if let Ok(segments) = outcome {
                for segment in &segments {
                    table.push_extending(record_from_object(segment));
                }
            }
        }
        table
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

    /// Canned portal serving fixed bodies by URL substring.
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

            if url.contains("/you/") {
                return Ok(concat!(
                    "new exports.quickInviteModal(",
                    r#"[{"id":"e1","sex":"F","first_name":"Ada","last_name":"L"},"#,
                    r#"{"id":"e2","sex":"M","first_name":"Bob","last_name":"L"}]"#,
                    r#","0123456789abcdef");new exports.next();"#
                )
                .to_string());
            }
            if url.contains("your-connections") {
                return Ok(r#"{"data":[{"profile_id":"conn1"}]}"#.to_string());
            }
            if url.contains("switch-profile") {
                return Ok(String::new());
            }
            if url.contains("/dna/ajax/") {
                return Ok(r#"{"profiles":[{"id":"dp1"}]}"#.to_string());
            }
            if url.contains("/download/") {
                return Ok("col1,col2\na,b\n".to_string());
            }
            if url.contains("/relatives/ajax/") {
                return Ok(concat!(
                    r#"{"relatives":["#,
                    r#"{"match_id":"m1","human_id":"h1","new_share_status":"ACCEPTED"},"#,
                    r#"{"match_id":"m2","human_id":"h2","new_share_status":"NONE"}"#,
                    "]}"
                )
                .to_string());
            }
            if url.contains("relatives_in_common") {
                return Ok(concat!(
                    r#"{"relatives_in_common":[{"local_ehid":"e1","owner_ehid":"conn1","#,
                    r#""remote_ehid":"h9","is_open_sharing":false}]}"#
                )
                .to_string());
            }
            if url.contains("/tools/ibd/") {
                return Ok(r#"[{"chromosome":"1","start":1,"end":2}]"#.to_string());
            }
            panic!("unexpected url: {}", url);
        }
    }

    #[tokio::test]
    async fn test_extended_harvest_accumulates_pairs_and_ibd() {
        let portal = CannedPortal::new();
        let harvester = TwentyThreeHarvester::new(&portal, 2);

        let harvest = harvester.harvest(true).await.unwrap();

        assert_eq!(harvest.profiles.len(), 2);
        assert_eq!(harvest.connections.len(), 1);
        assert_eq!(harvest.per_profile.len(), 2);

        // Only the sharing relative produced a relatives-in-common call.
        let ric_calls = portal
            .urls()
            .iter()
            .filter(|u| u.contains("relatives_in_common"))
            .count();
        assert_eq!(ric_calls, 2); // one per profile

        // Pairs: (profile, h1) for both profiles, plus the in-common
        // triangle rows, deduplicated and normalized.
        let ibd = harvest.ibd.unwrap();
        assert!(!ibd.is_empty());
    }

    #[tokio::test]
    async fn test_basic_harvest_skips_extended_calls() {
        let portal = CannedPortal::new();
        let harvester = TwentyThreeHarvester::new(&portal, 2);

        let harvest = harvester.harvest(false).await.unwrap();

        assert!(harvest.ibd.is_none());
        assert!(portal
            .urls()
            .iter()
            .all(|u| !u.contains("relatives_in_common") && !u.contains("/tools/ibd/")));
    }

    #[tokio::test]
    async fn test_profiles_switch_in_account_order() {
        let portal = CannedPortal::new();
        let harvester = TwentyThreeHarvester::new(&portal, 2);

        harvester.harvest(false).await.unwrap();

        let switches: Vec<String> = portal
            .urls()
            .iter()
            .filter(|u| u.contains("switch-profile"))
            .cloned()
            .collect();
        assert_eq!(switches.len(), 2);
        assert!(switches[0].contains("profile-id=e1"));
        assert!(switches[1].contains("profile-id=e2"));
    }

    #[tokio::test]
    async fn test_denied_relatives_does_not_void_account() {
        struct DenyingPortal {
            inner: CannedPortal,
        }

        #[async_trait]
        impl PerformRequest for DenyingPortal {
            async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
                if descriptor.url.contains("/relatives/ajax/") {
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
        let harvester = TwentyThreeHarvester::new(&portal, 2);

        let harvest = harvester.harvest(false).await.unwrap();
        assert!(harvest.per_profile.iter().all(|p| p.relatives.is_none()));
        assert_eq!(harvest.per_profile.len(), 2);
    }
}
