pub mod config;
pub mod crawl;
pub mod error;
pub mod events;
pub mod models;
pub mod request;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{CrawlConfig, RetryPolicy};
pub use crawl::{CrawlFailure, CrawlOrchestrator, CrawlState, crawl};
pub use error::{AppError, Violation};
pub use events::{CrawlEvent, CrawlReporter, NullReporter, TracingCrawlReporter};
pub use models::{
    CrawlResult, JobListingRef, JobRecord, PageCursor, SkippedListing, StopReason, compute_hash,
};
pub use request::{CrawlRequest, DateInput, DateRange, JobCategory, JobCategorySet};
pub use traits::{Cleaner, Fetcher, SiteBackend};
