use std::time::Duration;

use uuid::Uuid;

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    Started {
        crawl_id: Uuid,
        backend: &'a str,
    },
    PageScraped {
        page: u32,
        listings: usize,
    },
    ListingSkipped {
        page: u32,
        url: &'a str,
        error: &'a str,
    },
    RetryScheduled {
        page: u32,
        attempt: u32,
        delay: Duration,
        error: &'a str,
    },
    PageLimitReached {
        max_pages: u32,
    },
    Completed {
        total: usize,
        skipped: usize,
        pages: u32,
    },
    Failed {
        page: u32,
        error: &'a str,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl CrawlReporter for NullReporter {}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::Started { crawl_id, backend } => {
                tracing::info!(%crawl_id, %backend, "Starting crawl");
            }
            CrawlEvent::PageScraped { page, listings } => {
                tracing::info!(%page, %listings, "Scraped page");
            }
            CrawlEvent::ListingSkipped { page, url, error } => {
                tracing::warn!(%page, %url, %error, "Skipping listing");
            }
            CrawlEvent::RetryScheduled {
                page,
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(
                    %page,
                    %attempt,
                    delay_ms = %delay.as_millis(),
                    %error,
                    "Page fetch failed, retrying"
                );
            }
            CrawlEvent::PageLimitReached { max_pages } => {
                tracing::warn!(%max_pages, "Page limit reached, stopping pagination");
            }
            CrawlEvent::Completed {
                total,
                skipped,
                pages,
            } => {
                tracing::info!(%total, %skipped, %pages, "Crawl complete");
            }
            CrawlEvent::Failed { page, error } => {
                tracing::error!(%page, %error, "Crawl failed");
            }
        }
    }
}
