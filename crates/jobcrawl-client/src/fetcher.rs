use std::time::Duration;

use jobcrawl_core::error::AppError;
use jobcrawl_core::traits::Fetcher;
use reqwest::{Client, StatusCode};

const DEFAULT_USER_AGENT: &str = concat!("jobcrawl/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with a configurable User-Agent and timeout. Response
/// status codes are classified so the orchestrator can tell transient
/// failures (429, 5xx, connection problems) from permanent ones.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        Self::build(DEFAULT_USER_AGENT, timeout)
    }

    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        Self::build(user_agent, timeout)
    }

    fn build(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        check_status(response.status(), url)?;

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<(), AppError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Err(AppError::RateLimitExceeded)
    } else if status.is_server_error() {
        Err(AppError::NetworkError(format!(
            "HTTP {} for {}",
            status.as_u16(),
            url
        )))
    } else {
        Err(AppError::HttpError(format!(
            "HTTP {} for {}",
            status.as_u16(),
            url
        )))
    }
}
