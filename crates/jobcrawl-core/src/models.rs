use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

/// One listing discovered on a search results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobListingRef {
    /// Detail page URL (or any identifier the backend understands).
    pub url: String,
    /// Title as shown in the results, when the page exposes one.
    pub title: Option<String>,
}

impl JobListingRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Fully extracted job posting. Field names are chosen by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub listing_url: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// SHA-256 of the serialized fields
    pub fingerprint: String,
}

impl JobRecord {
    pub fn new(
        listing_url: impl Into<String>,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let fingerprint = compute_hash(&serde_json::Value::Object(fields.clone()).to_string());
        Self {
            listing_url: listing_url.into(),
            fields,
            fingerprint,
        }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// A listing whose detail page could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedListing {
    pub page: u32,
    pub url: String,
    pub error: String,
}

/// Why the pagination loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The backend reported no further pages.
    Exhausted,
    /// The configured page bound was reached first.
    PageLimit,
}

/// Records collected by one crawl, in page-then-listing order.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub crawl_id: Uuid,
    pub backend: String,
    pub records: Vec<JobRecord>,
    pub skipped: Vec<SkippedListing>,
    pub pages_scraped: u32,
    /// `None` while the crawl is still running or when it failed.
    pub stop_reason: Option<StopReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlResult {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            crawl_id: Uuid::new_v4(),
            backend: backend.into(),
            records: Vec::new(),
            skipped: Vec::new(),
            pages_scraped: 0,
            stop_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn finish(&mut self, stop_reason: Option<StopReason>) {
        self.stop_reason = stop_reason;
        self.finished_at = Some(Utc::now());
    }
}

/// Pagination position threaded through the crawl loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// 1-based page number.
    pub page: u32,
    pub url: Url,
    /// Listing references returned for this page (0 until it is fetched).
    pub listings: usize,
}

impl PageCursor {
    pub fn first(url: Url) -> Self {
        Self {
            page: 1,
            url,
            listings: 0,
        }
    }

    /// Cursor for the following page at `url`.
    pub fn advance(&self, url: Url) -> Self {
        Self {
            page: self.page + 1,
            url,
            listings: 0,
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
