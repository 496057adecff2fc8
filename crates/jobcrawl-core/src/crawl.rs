//! Pagination-driven crawl loop.
//!
//! # Crawl States
//!
//! ```text
//! INIT --[mapping ok, search url]--> SEARCHING --[next url]--> PAGINATING --+
//!                                        |                        ^         |
//!                                        |                        +---------+
//!                                        +--------[no next url]--------------> DONE
//!
//! any non-terminal state --[unrecoverable error / cancel]--> FAILED
//! ```

use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::events::{CrawlEvent, CrawlReporter, TracingCrawlReporter};
use crate::models::{CrawlResult, JobListingRef, PageCursor, SkippedListing, StopReason};
use crate::request::CrawlRequest;
use crate::traits::SiteBackend;

/// Lifecycle of a [`CrawlOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    Searching,
    Paginating,
    Done,
    Failed,
}

impl CrawlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlState::Init => "init",
            CrawlState::Searching => "searching",
            CrawlState::Paginating => "paginating",
            CrawlState::Done => "done",
            CrawlState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Failed)
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A crawl that ended in [`CrawlState::Failed`].
///
/// Records gathered before the failure are kept in `partial`, together with
/// any listings skipped along the way.
#[derive(Error, Debug)]
#[error("crawl failed while {state} (page {page}): {error}")]
pub struct CrawlFailure {
    #[source]
    pub error: AppError,
    /// State the orchestrator was in when the error surfaced.
    pub state: CrawlState,
    /// Page being processed, 0 if the failure happened before the first fetch.
    pub page: u32,
    pub partial: Box<CrawlResult>,
}

/// Drives one [`SiteBackend`] through a full crawl.
pub struct CrawlOrchestrator<B: SiteBackend> {
    request: CrawlRequest,
    backend: B,
    config: CrawlConfig,
    state: CrawlState,
}

impl<B: SiteBackend> CrawlOrchestrator<B> {
    pub fn new(request: CrawlRequest, backend: B) -> Self {
        Self::with_config(request, backend, CrawlConfig::default())
    }

    pub fn with_config(request: CrawlRequest, backend: B, config: CrawlConfig) -> Self {
        Self {
            request,
            backend,
            config,
            state: CrawlState::Init,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn request(&self) -> &CrawlRequest {
        &self.request
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the crawl to completion, failure, or cancellation.
    ///
    /// Each page is fetched, its listings extracted in order, and the backend
    /// asked for the next page until it returns `None`. Listing-level
    /// failures are skipped and reported in [`CrawlResult::skipped`];
    /// page-level failures are retried per [`CrawlConfig::retry`] and then
    /// fail the crawl with the partial result attached.
    pub async fn run<R: CrawlReporter>(
        &mut self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CrawlResult, CrawlFailure> {
        let mut result = CrawlResult::new(self.backend.name());

        if self.state != CrawlState::Init {
            return Err(CrawlFailure {
                error: AppError::Generic(format!("crawl already {}", self.state)),
                state: self.state,
                page: 0,
                partial: Box::new(result),
            });
        }

        reporter.report(CrawlEvent::Started {
            crawl_id: result.crawl_id,
            backend: &result.backend,
        });

        match self.drive(&mut result, cancel, reporter).await {
            Ok(stop_reason) => {
                self.state = CrawlState::Done;
                result.finish(Some(stop_reason));
                reporter.report(CrawlEvent::Completed {
                    total: result.records.len(),
                    skipped: result.skipped.len(),
                    pages: result.pages_scraped,
                });
                Ok(result)
            }
            Err((error, page)) => {
                let state = self.state;
                self.state = CrawlState::Failed;
                result.finish(None);
                let message = error.to_string();
                reporter.report(CrawlEvent::Failed {
                    page,
                    error: &message,
                });
                Err(CrawlFailure {
                    error,
                    state,
                    page,
                    partial: Box::new(result),
                })
            }
        }
    }

    async fn drive<R: CrawlReporter>(
        &mut self,
        result: &mut CrawlResult,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<StopReason, (AppError, u32)> {
        // Surface mapping defects before any network activity.
        for category in self.request.categories().iter() {
            self.backend.map_category(category).map_err(|e| (e, 0))?;
        }

        self.state = CrawlState::Searching;
        let url = self
            .backend
            .generate_search_url(&self.request)
            .map_err(|e| (e, 0))?;
        let mut cursor = PageCursor::first(url);

        loop {
            if cancel.is_cancelled() {
                return Err((AppError::Cancelled, cursor.page));
            }

            let page = cursor.page;
            let listings = with_retry(&self.config, page, cancel, reporter, || {
                self.backend.fetch_listing_page(&cursor)
            })
            .await
            .map_err(|e| (e, page))?;

            cursor.listings = listings.len();
            self.extract_page(page, listings, result, cancel, reporter)
                .await
                .map_err(|e| (e, page))?;
            result.pages_scraped = page;
            reporter.report(CrawlEvent::PageScraped {
                page,
                listings: cursor.listings,
            });

            let next = with_retry(&self.config, page, cancel, reporter, || {
                self.backend.next_page_url(&self.request, &cursor)
            })
            .await
            .map_err(|e| (e, page))?;

            match next {
                None => return Ok(StopReason::Exhausted),
                Some(_) if page >= self.config.max_pages => {
                    reporter.report(CrawlEvent::PageLimitReached {
                        max_pages: self.config.max_pages,
                    });
                    return Ok(StopReason::PageLimit);
                }
                Some(url) => {
                    cursor = cursor.advance(url);
                    self.state = CrawlState::Paginating;
                }
            }
        }
    }

    /// Extract every listing of one page, appending records in listing order.
    async fn extract_page<R: CrawlReporter>(
        &self,
        page: u32,
        listings: Vec<JobListingRef>,
        result: &mut CrawlResult,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let backend = &self.backend;
        let config = &self.config;

        // `buffered` yields in input order even when futures finish out of order.
        let outcomes: Vec<_> = stream::iter(listings)
            .map(|listing| async move {
                let outcome = guarded(config, cancel, backend.extract_details(&listing)).await;
                (listing, outcome)
            })
            .buffered(config.detail_concurrency.max(1))
            .collect()
            .await;

        for (listing, outcome) in outcomes {
            match outcome {
                Ok(record) => result.records.push(record),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(CrawlEvent::ListingSkipped {
                        page,
                        url: &listing.url,
                        error: &error,
                    });
                    result.skipped.push(SkippedListing {
                        page,
                        url: listing.url,
                        error,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Run `fut` under the configured timeout, aborting early on cancellation.
async fn guarded<T, Fut>(
    config: &CrawlConfig,
    cancel: &CancellationToken,
    fut: Fut,
) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        outcome = tokio::time::timeout(config.fetch_timeout, fut) => {
            outcome.unwrap_or_else(|_| Err(AppError::Timeout(config.fetch_timeout.as_secs())))
        }
        () = cancel.cancelled() => Err(AppError::Cancelled),
    }
}

/// Retry a page-level operation on retryable errors with exponential backoff.
async fn with_retry<T, F, Fut, R>(
    config: &CrawlConfig,
    page: u32,
    cancel: &CancellationToken,
    reporter: &R,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    R: CrawlReporter,
{
    let mut attempt = 0;
    loop {
        match guarded(config, cancel, op()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.retry.max_retries => {
                attempt += 1;
                let delay = config.retry.delay_for_attempt(attempt);
                let message = e.to_string();
                reporter.report(CrawlEvent::RetryScheduled {
                    page,
                    attempt,
                    delay,
                    error: &message,
                });
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err(AppError::Cancelled),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Crawl with default configuration, logging through `tracing`.
pub async fn crawl<B: SiteBackend>(
    request: CrawlRequest,
    backend: B,
) -> Result<CrawlResult, CrawlFailure> {
    CrawlOrchestrator::new(request, backend)
        .run(&CancellationToken::new(), &TracingCrawlReporter)
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::events::NullReporter;
    use crate::request::JobCategory;
    use crate::testutil::*;

    fn request() -> CrawlRequest {
        CrawlRequest::new(
            "2024-01-01",
            "2024-01-31",
            &["Software Development", "Cybersecurity"],
            "Berlin",
        )
        .unwrap()
    }

    fn fast_config() -> CrawlConfig {
        CrawlConfig::default().with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        })
    }

    fn urls(result: &CrawlResult) -> Vec<&str> {
        result
            .records
            .iter()
            .map(|r| r.listing_url.as_str())
            .collect()
    }

    #[tokio::test]
    async fn records_follow_page_then_listing_order() {
        let backend = MockBackend::with_pages(vec![
            listings(&["p1-a", "p1-b"]),
            vec![],
            listings(&["p3-a"]),
        ]);
        let mut orch = CrawlOrchestrator::with_config(request(), backend, fast_config());

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        assert_eq!(orch.state(), CrawlState::Done);
        assert_eq!(result.len(), 3);
        assert_eq!(
            urls(&result),
            vec![
                "https://mock.jobs/p1-a",
                "https://mock.jobs/p1-b",
                "https://mock.jobs/p3-a"
            ]
        );
        assert_eq!(result.pages_scraped, 3);
        assert_eq!(result.stop_reason, Some(StopReason::Exhausted));
        assert!(result.skipped.is_empty());
        assert!(result.finished_at.is_some());
    }

    #[tokio::test]
    async fn ordering_is_reproducible_across_runs() {
        let pages = vec![listings(&["a", "b", "c"]), listings(&["d", "e"])];
        let mut first = CrawlOrchestrator::new(request(), MockBackend::with_pages(pages.clone()));
        let mut second = CrawlOrchestrator::new(request(), MockBackend::with_pages(pages));

        let a = first.run(&CancellationToken::new(), &NullReporter).await.unwrap();
        let b = second.run(&CancellationToken::new(), &NullReporter).await.unwrap();

        assert_eq!(urls(&a), urls(&b));
        let fingerprints = |r: &CrawlResult| {
            r.records
                .iter()
                .map(|rec| rec.fingerprint.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(fingerprints(&a), fingerprints(&b));
    }

    #[tokio::test]
    async fn concurrent_detail_fetches_keep_listing_order() {
        let backend = MockBackend::with_pages(vec![listings(&["a", "b", "c", "d", "e", "f"])])
            .with_detail_delays(vec![
                ("a", Duration::from_millis(30)),
                ("b", Duration::from_millis(5)),
                ("c", Duration::from_millis(20)),
            ]);
        let config = fast_config().with_detail_concurrency(4);
        let mut orch = CrawlOrchestrator::with_config(request(), backend, config);

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        let expected: Vec<String> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|s| format!("https://mock.jobs/{s}"))
            .collect();
        assert_eq!(urls(&result), expected);
    }

    #[tokio::test]
    async fn failing_listing_is_skipped_not_fatal() {
        let backend = MockBackend::with_pages(vec![
            listings(&["a", "b", "c"]),
            listings(&["d", "e"]),
        ])
        .with_failing_detail("c");
        let mut orch = CrawlOrchestrator::with_config(request(), backend, fast_config());

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        assert_eq!(orch.state(), CrawlState::Done);
        assert_eq!(result.len(), 4);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].url, "https://mock.jobs/c");
        assert_eq!(result.skipped[0].page, 1);
        assert!(!urls(&result).contains(&"https://mock.jobs/c"));
    }

    #[tokio::test]
    async fn page_failure_after_retries_keeps_partial_result() {
        let backend = MockBackend::with_pages(vec![
            listings(&["a", "b"]),
            listings(&["c"]),
            listings(&["d"]),
        ])
        .with_failing_page(2, u32::MAX, || AppError::NetworkError("reset".into()));
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert_eq!(orch.state(), CrawlState::Failed);
        assert_eq!(failure.state, CrawlState::Paginating);
        assert_eq!(failure.page, 2);
        assert!(failure.error.is_fetch_failure());
        assert_eq!(
            urls(&failure.partial),
            vec!["https://mock.jobs/a", "https://mock.jobs/b"]
        );
        // One initial attempt plus two retries.
        assert_eq!(backend.page_fetches(2), 3);
    }

    #[tokio::test]
    async fn transient_page_failure_recovers_within_retry_budget() {
        let backend = MockBackend::with_pages(vec![listings(&["a"]), listings(&["b"])])
            .with_failing_page(2, 2, || AppError::Timeout(1));
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(backend.page_fetches(2), 3);
    }

    #[tokio::test]
    async fn malformed_page_is_not_retried() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]).with_failing_page(
            1,
            u32::MAX,
            || AppError::FetchError("no listing container".into()),
        );
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::FetchError(_)));
        assert_eq!(failure.state, CrawlState::Searching);
        assert_eq!(backend.page_fetches(1), 1);
        assert!(failure.partial.is_empty());
    }

    fn next_calls(backend: &MockBackend, page: u32) -> usize {
        let call = format!("next:{page}");
        backend.calls().iter().filter(|c| **c == call).count()
    }

    #[tokio::test]
    async fn pagination_failure_exhausts_retries_and_keeps_partial() {
        let backend =
            MockBackend::with_pages(vec![listings(&["a"]), listings(&["b"]), listings(&["c"])])
                .with_failing_next(2, u32::MAX, || AppError::NetworkError("reset".into()));
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert_eq!(orch.state(), CrawlState::Failed);
        assert_eq!(failure.state, CrawlState::Paginating);
        assert_eq!(failure.page, 2);
        assert!(matches!(failure.error, AppError::NetworkError(_)));
        assert_eq!(
            urls(&failure.partial),
            vec!["https://mock.jobs/a", "https://mock.jobs/b"]
        );
        assert_eq!(failure.partial.pages_scraped, 2);
        assert_eq!(next_calls(&backend, 2), 3);
        assert_eq!(backend.page_fetches(3), 0);
    }

    #[tokio::test]
    async fn non_retryable_pagination_failure_is_not_retried() {
        let backend = MockBackend::with_pages(vec![listings(&["a"]), listings(&["b"])])
            .with_failing_next(1, u32::MAX, || {
                AppError::FetchError("pager markup changed".into())
            });
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert_eq!(orch.state(), CrawlState::Failed);
        assert_eq!(failure.state, CrawlState::Searching);
        assert!(matches!(failure.error, AppError::FetchError(_)));
        assert_eq!(urls(&failure.partial), vec!["https://mock.jobs/a"]);
        assert_eq!(next_calls(&backend, 1), 1);
    }

    #[tokio::test]
    async fn transient_pagination_failure_recovers() {
        let backend = MockBackend::with_pages(vec![listings(&["a"]), listings(&["b"])])
            .with_failing_next(1, 1, || AppError::RateLimitExceeded);
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(next_calls(&backend, 1), 2);
    }

    #[tokio::test]
    async fn missing_category_mapping_fails_before_any_fetch() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])])
            .without_mapping(JobCategory::Cybersecurity);
        let mut orch = CrawlOrchestrator::with_config(request(), backend.clone(), fast_config());

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::MappingError { .. }));
        assert_eq!(failure.state, CrawlState::Init);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn next_page_absence_is_idempotent() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]);
        let req = request();
        let url = backend.generate_search_url(&req).unwrap();
        let mut cursor = PageCursor::first(url);
        cursor.listings = 1;

        assert_eq!(backend.next_page_url(&req, &cursor).await.unwrap(), None);
        assert_eq!(backend.next_page_url(&req, &cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn next_page_is_not_requested_after_termination() {
        let backend = MockBackend::with_pages(vec![listings(&["a"]), listings(&["b"])]);
        let mut orch = CrawlOrchestrator::new(request(), backend.clone());

        orch.run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        let next_calls = backend
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("next:"))
            .count();
        assert_eq!(next_calls, 2);
    }

    #[tokio::test]
    async fn page_limit_stops_endless_pagination() {
        let backend = MockBackend::endless(listings(&["x"]));
        let config = fast_config().with_max_pages(4);
        let mut orch = CrawlOrchestrator::with_config(request(), backend, config);

        let result = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap();

        assert_eq!(orch.state(), CrawlState::Done);
        assert_eq!(result.pages_scraped, 4);
        assert_eq!(result.len(), 4);
        assert_eq!(result.stop_reason, Some(StopReason::PageLimit));
    }

    #[tokio::test]
    async fn cancellation_before_start_fails_with_empty_partial() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]);
        let mut orch = CrawlOrchestrator::new(request(), backend.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = orch.run(&cancel, &NullReporter).await.unwrap_err();

        assert!(matches!(failure.error, AppError::Cancelled));
        assert_eq!(orch.state(), CrawlState::Failed);
        assert!(failure.partial.is_empty());
        assert_eq!(backend.page_fetches(1), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_retry_backoff() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]).with_failing_page(
            1,
            u32::MAX,
            || AppError::RateLimitExceeded,
        );
        let config = CrawlConfig::default().with_retry(RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        });
        let mut orch = CrawlOrchestrator::with_config(request(), backend, config);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let failure = tokio::time::timeout(Duration::from_secs(5), orch.run(&cancel, &NullReporter))
            .await
            .expect("cancellation should end the crawl promptly")
            .unwrap_err();

        assert!(matches!(failure.error, AppError::Cancelled));
    }

    #[tokio::test]
    async fn slow_page_times_out() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])])
            .with_page_delay(Duration::from_millis(200));
        let config = CrawlConfig::default()
            .with_fetch_timeout(Duration::from_millis(20))
            .with_retry(RetryPolicy::none());
        let mut orch = CrawlOrchestrator::with_config(request(), backend, config);

        let failure = orch
            .run(&CancellationToken::new(), &NullReporter)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn run_is_single_use() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]);
        let mut orch = CrawlOrchestrator::new(request(), backend);
        let cancel = CancellationToken::new();

        orch.run(&cancel, &NullReporter).await.unwrap();
        let failure = orch.run(&cancel, &NullReporter).await.unwrap_err();

        assert!(matches!(failure.error, AppError::Generic(_)));
        assert_eq!(orch.state(), CrawlState::Done);
    }

    #[tokio::test]
    async fn reporter_sees_lifecycle_events() {
        let backend = MockBackend::with_pages(vec![listings(&["a", "b"]), listings(&["c"])])
            .with_failing_detail("b");
        let reporter = RecordingReporter::default();
        let mut orch = CrawlOrchestrator::new(request(), backend);

        orch.run(&CancellationToken::new(), &reporter).await.unwrap();

        assert_eq!(
            reporter.events(),
            vec![
                "started:mock".to_string(),
                "skipped:1:https://mock.jobs/b".to_string(),
                "page:1:2".to_string(),
                "page:2:1".to_string(),
                "completed:2:1:2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn crawl_helper_runs_with_defaults() {
        let backend = MockBackend::with_pages(vec![listings(&["a"])]);
        let result = crawl(request(), backend).await.unwrap();
        assert_eq!(result.backend, "mock");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CrawlState::Init.is_terminal());
        assert!(!CrawlState::Searching.is_terminal());
        assert!(!CrawlState::Paginating.is_terminal());
        assert!(CrawlState::Done.is_terminal());
        assert!(CrawlState::Failed.is_terminal());
    }
}
