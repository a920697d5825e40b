//! Paged listing collection.
//!
//! Page N's existence is only known after page N-1 arrives, so collection
//! is strictly sequential. A page request that fails terminally aborts the
//! whole collection; a truncated result must never masquerade as a
//! complete one.

use kinharvest_core::RequestDescriptor;
use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::session::PerformRequest;

/// First page number vendors use.
const FIRST_PAGE: u32 = 1;

/// Sequentially collects every page of a listing endpoint.
pub struct PageCollector<'a> {
    session: &'a dyn PerformRequest,
}

impl<'a> PageCollector<'a> {
    /// Creates a collector over a perform seam.
    pub fn new(session: &'a dyn PerformRequest) -> Self {
        Self { session }
    }

    /// Collects pages starting at 1 until one yields zero items, or until
    /// `total` items have accumulated when the vendor reports an
    /// authoritative total.
    ///
    /// Re-invocation re-issues every page request; nothing is cached
    /// across calls.
    #[instrument(skip_all)]
    pub async fn collect_all<T>(
        &self,
        page_request: impl Fn(u32) -> RequestDescriptor,
        extract_items: impl Fn(&str) -> Result<Vec<T>, FetchError>,
        total: Option<usize>,
    ) -> Result<Vec<T>, FetchError> {
        let mut items = Vec::new();
        let mut page = FIRST_PAGE;

        loop {
            let body = self.session.perform(&page_request(page)).await?;
            let page_items = extract_items(&body)?;

            debug!(page, count = page_items.len(), "Collected page");

            if page_items.is_empty() {
                break;
            }
            items.extend(page_items);

            if total.is_some_and(|t| items.len() >= t) {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Fake paginator serving fixed page bodies by page number.
    struct FakePaginator {
        pages: Vec<Vec<u32>>,
        requests: StdMutex<Vec<String>>,
    }

    impl FakePaginator {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PerformRequest for FakePaginator {
        async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(descriptor.url.clone());

            let page: usize = descriptor
                .url
                .rsplit("page=")
                .next()
                .unwrap()
                .parse()
                .unwrap();
            let items = self.pages.get(page - 1).cloned().unwrap_or_default();
            Ok(serde_json::to_string(&items).unwrap())
        }
    }

    fn page_request(page: u32) -> RequestDescriptor {
        RequestDescriptor::get(format!("https://vendor.example/matches?page={}", page))
    }

    fn extract(body: &str) -> Result<Vec<u32>, FetchError> {
        Ok(serde_json::from_str(body)?)
    }

    #[tokio::test]
    async fn test_three_pages_then_empty() {
        let paginator = FakePaginator::new(vec![vec![1, 2], vec![3, 4], vec![5], vec![]]);
        let collector = PageCollector::new(&paginator);

        let items = collector
            .collect_all(page_request, extract, None)
            .await
            .unwrap();

        // Concatenation in page order, and exactly 4 requests: the three
        // non-empty pages plus the empty terminator.
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(paginator.request_count(), 4);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let paginator = FakePaginator::new(vec![vec![]]);
        let collector = PageCollector::new(&paginator);

        let items = collector
            .collect_all(page_request, extract, None)
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(paginator.request_count(), 1);
    }

    #[tokio::test]
    async fn test_authoritative_total_stops_early() {
        let paginator = FakePaginator::new(vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
        let collector = PageCollector::new(&paginator);

        let items = collector
            .collect_all(page_request, extract, Some(4))
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        // No request for the page past the total.
        assert_eq!(paginator.request_count(), 2);
    }

    #[tokio::test]
    async fn test_terminal_page_failure_aborts_collection() {
        struct FailOnSecondPage {
            requests: StdMutex<u32>,
        }

        #[async_trait]
        impl PerformRequest for FailOnSecondPage {
            async fn perform(&self, descriptor: &RequestDescriptor) -> Result<String, FetchError> {
                let mut count = self.requests.lock().unwrap();
                *count += 1;
                if *count == 2 {
                    return Err(FetchError::Forbidden {
                        url: descriptor.url.clone(),
                    });
                }
                Ok("[1,2]".to_string())
            }
        }

        let paginator = FailOnSecondPage {
            requests: StdMutex::new(0),
        };
        let collector = PageCollector::new(&paginator);

        let result = collector.collect_all(page_request, extract, None).await;

        // The caller sees the failure, never a silently truncated list.
        assert!(matches!(result, Err(FetchError::Forbidden { .. })));
    }
}
