//! Bounded-concurrency batch fetching.
//!
//! A harvest builds hundreds to thousands of independent per-pair
//! requests. They run under a bounded degree of parallelism, and a
//! terminal failure of one key never cancels its siblings: the vendor
//! relationship graph is best-effort, and a handful of unreachable pairs
//! should not void a multi-thousand-request harvest. The result accounts
//! for every submitted key exactly once.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use futures::StreamExt;
use kinharvest_core::RequestDescriptor;
use tracing::{info, instrument, warn};

use crate::error::FetchError;
use crate::session::PerformRequest;

/// Default worker-pool size.
pub const DEFAULT_PARALLELISM: usize = 8;

// ============================================================================
// Batch Result
// ============================================================================

/// Outcome of a batch: every submitted key mapped to its payload or its
/// terminal failure.
#[derive(Debug)]
pub struct BatchResult<K, V> {
    outcomes: HashMap<K, Result<V, FetchError>>,
}

impl<K: Eq + Hash, V> BatchResult<K, V> {
    /// Returns the number of keys accounted for.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no keys were submitted.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Returns the outcome recorded for a key.
    pub fn get(&self, key: &K) -> Option<&Result<V, FetchError>> {
        self.outcomes.get(key)
    }

    /// Iterates over successful keys and their payloads.
    pub fn successes(&self) -> impl Iterator<Item = (&K, &V)> {
        self.outcomes
            .iter()
            .filter_map(|(k, r)| r.as_ref().ok().map(|v| (k, v)))
    }

    /// Iterates over failed keys and their terminal errors.
    pub fn failures(&self) -> impl Iterator<Item = (&K, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|e| (k, e)))
    }

    /// Returns the number of successful keys.
    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Returns the number of failed keys.
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Consumes the result, yielding every (key, outcome) pair.
    pub fn into_outcomes(self) -> impl Iterator<Item = (K, Result<V, FetchError>)> {
        self.outcomes.into_iter()
    }
}

// ============================================================================
// Batch Fetcher
// ============================================================================

/// Executes independent request descriptors with bounded parallelism.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    parallelism: usize,
}

impl BatchFetcher {
    /// Creates a fetcher with the given worker-pool size (minimum 1).
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// Fetches every key's request, recording success or terminal failure
    /// per key. Completion order between keys is unspecified; the returned
    /// mapping is the only global guarantee.
    #[instrument(skip_all, fields(parallelism = self.parallelism))]
    pub async fn fetch_all<K, V>(
        &self,
        session: &dyn PerformRequest,
        keys: impl IntoIterator<Item = K>,
        to_request: impl Fn(&K) -> RequestDescriptor + Sync,
        parse: impl Fn(&str) -> Result<V, FetchError> + Sync,
    ) -> BatchResult<K, V>
    where
        K: Eq + Hash + Debug + Send,
        V: Send,
    {
        let to_request = &to_request;
        let parse = &parse;

        let outcomes: HashMap<K, Result<V, FetchError>> =
            futures::stream::iter(keys.into_iter().map(|key| async move {
                let descriptor = to_request(&key);
                let outcome = match session.perform(&descriptor).await {
                    Ok(body) => parse(&body),
                    Err(error) => Err(error),
                };
                if let Err(error) = &outcome {
                    warn!(key = ?key, %error, "Batch item failed terminally");
                }
                (key, outcome)
            }))
            .buffer_unordered(self.parallelism)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect();

        let failures = outcomes.values().filter(|r| r.is_err()).count();
        info!(
            total = outcomes.len(),
            failures, "Batch fetch completed"
        );

        BatchResult { outcomes }
    }
}

impl Default for BatchFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

// ============================================================================
// Tests
// ============================================================================
