use std::future::Future;

use url::Url;

use crate::error::AppError;
use crate::models::{JobListingRef, JobRecord, PageCursor};
use crate::request::{CrawlRequest, JobCategory};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts raw HTML into clean Markdown text.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Per-site adaptation: everything the orchestrator needs from one job board.
///
/// The orchestrator owns the [`PageCursor`] and hands it to every page-level
/// call, so implementations do not need to remember which page is current.
pub trait SiteBackend: Send + Sync {
    /// Short identifier used in logs and results.
    fn name(&self) -> &str;

    /// Initial search URL for the request. Must not depend on hidden state.
    fn generate_search_url(&self, request: &CrawlRequest) -> Result<Url, AppError>;

    /// Fetch the results page at `cursor.url`. An empty page is not an error.
    fn fetch_listing_page(
        &self,
        cursor: &PageCursor,
    ) -> impl Future<Output = Result<Vec<JobListingRef>, AppError>> + Send;

    /// Fetch and parse one listing's detail page.
    fn extract_details(
        &self,
        listing: &JobListingRef,
    ) -> impl Future<Output = Result<JobRecord, AppError>> + Send;

    /// URL of page `cursor.page + 1`, or `None` when there are no more pages.
    ///
    /// Once `None` is returned for a cursor, the same cursor must keep
    /// yielding `None`.
    fn next_page_url(
        &self,
        request: &CrawlRequest,
        cursor: &PageCursor,
    ) -> impl Future<Output = Result<Option<Url>, AppError>> + Send;

    /// Site-specific term for a canonical category, or [`AppError::MappingError`].
    fn map_category(&self, category: JobCategory) -> Result<String, AppError>;
}
