//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::error::AppError;
use crate::events::{CrawlEvent, CrawlReporter};
use crate::models::{JobListingRef, JobRecord, PageCursor};
use crate::request::{CrawlRequest, JobCategory};
use crate::traits::{Cleaner, Fetcher, SiteBackend};

const MOCK_BASE: &str = "https://mock.jobs/";

/// Listing refs under the mock board, one per slug.
pub fn listings(slugs: &[&str]) -> Vec<JobListingRef> {
    slugs
        .iter()
        .map(|slug| JobListingRef::new(format!("{MOCK_BASE}{slug}")).with_title(*slug))
        .collect()
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// Scripted failure for one results page.
#[derive(Clone)]
struct ScriptedFailure {
    remaining: u32,
    make: fn() -> AppError,
}

/// In-memory job board with scripted pages and failures.
///
/// Page `n` (1-based) serves `pages[n - 1]`. Pagination ends after the last
/// page unless the backend is [`endless`](Self::endless).
#[derive(Clone)]
pub struct MockBackend {
    pages: Vec<Vec<JobListingRef>>,
    endless: bool,
    unmapped: Vec<JobCategory>,
    failing_details: Vec<String>,
    detail_delays: HashMap<String, Duration>,
    page_delay: Duration,
    page_failures: Arc<Mutex<HashMap<u32, ScriptedFailure>>>,
    next_failures: Arc<Mutex<HashMap<u32, ScriptedFailure>>>,
    page_fetch_counts: Arc<Mutex<HashMap<u32, u32>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn with_pages(pages: Vec<Vec<JobListingRef>>) -> Self {
        Self {
            pages,
            endless: false,
            unmapped: Vec::new(),
            failing_details: Vec::new(),
            detail_delays: HashMap::new(),
            page_delay: Duration::ZERO,
            page_failures: Arc::new(Mutex::new(HashMap::new())),
            next_failures: Arc::new(Mutex::new(HashMap::new())),
            page_fetch_counts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every page serves the same listings and a next page always exists.
    pub fn endless(page: Vec<JobListingRef>) -> Self {
        Self {
            endless: true,
            ..Self::with_pages(vec![page])
        }
    }

    /// `map_category` fails for this category.
    pub fn without_mapping(mut self, category: JobCategory) -> Self {
        self.unmapped.push(category);
        self
    }

    /// `extract_details` fails for the listing with this slug.
    pub fn with_failing_detail(mut self, slug: &str) -> Self {
        self.failing_details.push(format!("{MOCK_BASE}{slug}"));
        self
    }

    /// `fetch_listing_page` fails `times` times for `page` before succeeding.
    pub fn with_failing_page(self, page: u32, times: u32, make: fn() -> AppError) -> Self {
        self.page_failures.lock().unwrap().insert(
            page,
            ScriptedFailure {
                remaining: times,
                make,
            },
        );
        self
    }

    /// `next_page_url` fails `times` times after `page` before succeeding.
    pub fn with_failing_next(self, page: u32, times: u32, make: fn() -> AppError) -> Self {
        self.next_failures.lock().unwrap().insert(
            page,
            ScriptedFailure {
                remaining: times,
                make,
            },
        );
        self
    }

    pub fn with_detail_delays(mut self, delays: Vec<(&str, Duration)>) -> Self {
        self.detail_delays = delays
            .into_iter()
            .map(|(slug, d)| (format!("{MOCK_BASE}{slug}"), d))
            .collect();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Calls made so far: `fetch:<page>`, `detail:<url>`, `next:<page>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `fetch_listing_page` attempts for `page`.
    pub fn page_fetches(&self, page: u32) -> u32 {
        self.page_fetch_counts
            .lock()
            .unwrap()
            .get(&page)
            .copied()
            .unwrap_or(0)
    }

    fn page_url(page: u32) -> Result<Url, AppError> {
        Url::parse(&format!("{MOCK_BASE}search?page={page}"))
            .map_err(|e| AppError::Generic(e.to_string()))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Consume one scripted failure for `page`, if any remain.
fn take_failure(
    failures: &Mutex<HashMap<u32, ScriptedFailure>>,
    page: u32,
) -> Result<(), AppError> {
    let mut failures = failures.lock().unwrap();
    if let Some(failure) = failures.get_mut(&page)
        && failure.remaining > 0
    {
        failure.remaining -= 1;
        return Err((failure.make)());
    }
    Ok(())
}

impl SiteBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate_search_url(&self, _request: &CrawlRequest) -> Result<Url, AppError> {
        Self::page_url(1)
    }

    async fn fetch_listing_page(
        &self,
        cursor: &PageCursor,
    ) -> Result<Vec<JobListingRef>, AppError> {
        self.record(format!("fetch:{}", cursor.page));
        *self
            .page_fetch_counts
            .lock()
            .unwrap()
            .entry(cursor.page)
            .or_insert(0) += 1;

        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        take_failure(&self.page_failures, cursor.page)?;

        let index = if self.endless { 0 } else { cursor.page as usize - 1 };
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn extract_details(&self, listing: &JobListingRef) -> Result<JobRecord, AppError> {
        self.record(format!("detail:{}", listing.url));

        if let Some(delay) = self.detail_delays.get(&listing.url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_details.contains(&listing.url) {
            return Err(AppError::HttpError(format!("HTTP 404 for {}", listing.url)));
        }

        let mut fields = serde_json::Map::new();
        fields.insert(
            "title".into(),
            serde_json::json!(listing.title.clone().unwrap_or_default()),
        );
        Ok(JobRecord::new(listing.url.clone(), fields))
    }

    async fn next_page_url(
        &self,
        _request: &CrawlRequest,
        cursor: &PageCursor,
    ) -> Result<Option<Url>, AppError> {
        self.record(format!("next:{}", cursor.page));
        take_failure(&self.next_failures, cursor.page)?;
        if self.endless || (cursor.page as usize) < self.pages.len() {
            Self::page_url(cursor.page + 1).map(Some)
        } else {
            Ok(None)
        }
    }

    fn map_category(&self, category: JobCategory) -> Result<String, AppError> {
        if self.unmapped.contains(&category) {
            return Err(AppError::MappingError {
                backend: self.name().to_string(),
                category: category.to_string(),
            });
        }
        Ok(category.as_str().to_lowercase().replace(' ', "-"))
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher serving fixed bodies per URL; unknown URLs return HTTP 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, Result<String, String>>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(html.to_string()));
        self
    }

    /// `url` fails with a network error.
    pub fn with_network_error(self, url: &str, message: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some(Ok(html)) => Ok(html.clone()),
            Some(Err(message)) => Err(AppError::NetworkError(message.clone())),
            None => Err(AppError::HttpError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns its input unchanged.
#[derive(Clone, Default)]
pub struct MockCleaner;

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a compact trace of lifecycle events.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let line = match event {
            CrawlEvent::Started { backend, .. } => format!("started:{backend}"),
            CrawlEvent::PageScraped { page, listings } => format!("page:{page}:{listings}"),
            CrawlEvent::ListingSkipped { page, url, .. } => format!("skipped:{page}:{url}"),
            CrawlEvent::Completed {
                total,
                skipped,
                pages,
            } => format!("completed:{total}:{skipped}:{pages}"),
            CrawlEvent::Failed { page, .. } => format!("failed:{page}"),
            CrawlEvent::RetryScheduled { .. } | CrawlEvent::PageLimitReached { .. } => return,
        };
        self.events.lock().unwrap().push(line);
    }
}
