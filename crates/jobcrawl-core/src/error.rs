use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

/// A single problem found while validating crawl input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The start of the date range falls after its end.
    DateOrder { start: NaiveDate, end: NaiveDate },
    /// A category label outside the canonical set.
    UnknownCategory(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DateOrder { start, end } => write!(
                f,
                "start date must not be after end date ({start} > {end})"
            ),
            Violation::UnknownCategory(label) => write!(f, "invalid job category '{label}'"),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application-wide error types for jobcrawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// A date string did not match the expected format.
    #[error("Parse error: '{value}' is not a valid date (expected {expected})")]
    ParseError {
        value: String,
        expected: &'static str,
    },

    /// Crawl input was rejected. Carries every violation found, not just the first.
    #[error("Validation error: {}", join_violations(.0))]
    ValidationError(Vec<Violation>),

    /// A canonical category has no equivalent on the target site.
    #[error("Mapping error: backend '{backend}' has no mapping for category '{category}'")]
    MappingError { backend: String, category: String },

    /// A page was fetched but could not be parsed.
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration (env vars, board profiles).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The crawl was cancelled by the caller.
    #[error("Crawl cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true for the family of errors raised while fetching or parsing pages.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            AppError::FetchError(_)
                | AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
        )
    }

    /// The violations carried by a validation error, empty for any other variant.
    pub fn violations(&self) -> &[Violation] {
        match self {
            AppError::ValidationError(v) => v,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(AppError::HttpError("connect refused".into()).is_retryable());
        assert!(!AppError::FetchError("missing listing container".into()).is_retryable());
        assert!(
            !AppError::MappingError {
                backend: "board".into(),
                category: "Cybersecurity".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_fetch_failure_family() {
        assert!(AppError::FetchError("bad".into()).is_fetch_failure());
        assert!(AppError::Timeout(5).is_fetch_failure());
        assert!(!AppError::Cancelled.is_fetch_failure());
        assert!(!AppError::ValidationError(vec![]).is_fetch_failure());
    }

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = AppError::ValidationError(vec![
            Violation::UnknownCategory("Foo".into()),
            Violation::UnknownCategory("Bar".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("'Foo'"));
        assert!(msg.contains("'Bar'"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_date_order_message() {
        let v = Violation::DateOrder {
            start: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert!(
            v.to_string()
                .starts_with("start date must not be after end date")
        );
    }
}
