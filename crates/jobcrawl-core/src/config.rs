use std::time::Duration;

use crate::error::AppError;

/// Bounded retry with exponential backoff for page-level fetches.
///
/// Delay for attempt `n` (1-indexed) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries at all: the first failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Tunables for one crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Hard stop for backends whose pagination never ends.
    pub max_pages: u32,
    /// Upper bound on any single backend call.
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    /// Detail pages fetched concurrently within one results page.
    pub detail_concurrency: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            fetch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            detail_concurrency: 1,
        }
    }
}

impl CrawlConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// - `JOBCRAWL_MAX_PAGES`
    /// - `JOBCRAWL_FETCH_TIMEOUT_SECS`
    /// - `JOBCRAWL_MAX_RETRIES`
    /// - `JOBCRAWL_RETRY_BASE_MS`
    /// - `JOBCRAWL_DETAIL_CONCURRENCY`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let max_pages = read_positive(&lookup, "JOBCRAWL_MAX_PAGES")?.unwrap_or(defaults.max_pages);
        let fetch_timeout = read_positive(&lookup, "JOBCRAWL_FETCH_TIMEOUT_SECS")?
            .map(|s| Duration::from_secs(s.into()))
            .unwrap_or(defaults.fetch_timeout);
        let detail_concurrency = read_positive(&lookup, "JOBCRAWL_DETAIL_CONCURRENCY")?
            .map(|n| n as usize)
            .unwrap_or(defaults.detail_concurrency);

        let mut retry = defaults.retry;
        if let Some(raw) = lookup("JOBCRAWL_MAX_RETRIES") {
            retry.max_retries = raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid JOBCRAWL_MAX_RETRIES '{raw}': must be a non-negative integer"
                ))
            })?;
        }
        if let Some(ms) = read_positive(&lookup, "JOBCRAWL_RETRY_BASE_MS")? {
            retry.base_delay = Duration::from_millis(ms.into());
        }

        Ok(Self {
            max_pages,
            fetch_timeout,
            retry,
            detail_concurrency,
        })
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_detail_concurrency(mut self, n: usize) -> Self {
        self.detail_concurrency = n.max(1);
        self
    }
}

fn read_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u32>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let parsed: u32 = raw.parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(Some(parsed))
}
