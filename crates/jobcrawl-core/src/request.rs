//! Crawl input: date range, canonical job categories, and location.
//!
//! Everything in here is validated once at construction and immutable
//! afterwards. No network activity happens until a [`CrawlRequest`] exists.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Violation};

/// Date format accepted for textual dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_FORMAT_HINT: &str = "YYYY-MM-DD";

/// One of the five job categories the crawler recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobCategory {
    #[serde(rename = "Software Development")]
    SoftwareDevelopment,
    #[serde(rename = "Data Science and Analytics")]
    DataScienceAndAnalytics,
    #[serde(rename = "Cloud Computing and DevOps")]
    CloudComputingAndDevOps,
    #[serde(rename = "Cybersecurity")]
    Cybersecurity,
    #[serde(rename = "Artificial Intelligence and Machine Learning")]
    ArtificialIntelligenceAndMachineLearning,
}

impl JobCategory {
    pub const ALL: [JobCategory; 5] = [
        JobCategory::SoftwareDevelopment,
        JobCategory::DataScienceAndAnalytics,
        JobCategory::CloudComputingAndDevOps,
        JobCategory::Cybersecurity,
        JobCategory::ArtificialIntelligenceAndMachineLearning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::SoftwareDevelopment => "Software Development",
            JobCategory::DataScienceAndAnalytics => "Data Science and Analytics",
            JobCategory::CloudComputingAndDevOps => "Cloud Computing and DevOps",
            JobCategory::Cybersecurity => "Cybersecurity",
            JobCategory::ArtificialIntelligenceAndMachineLearning => {
                "Artificial Intelligence and Machine Learning"
            }
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobCategory {
    type Err = AppError;

    /// Labels match exactly, as in the canonical list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::ValidationError(vec![Violation::UnknownCategory(s.into())]))
    }
}

/// A date as supplied by the caller: already typed, or text to be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Date(NaiveDate),
    Text(String),
}

impl From<NaiveDate> for DateInput {
    fn from(date: NaiveDate) -> Self {
        DateInput::Date(date)
    }
}

impl From<&str> for DateInput {
    fn from(text: &str) -> Self {
        DateInput::Text(text.to_string())
    }
}

impl From<String> for DateInput {
    fn from(text: String) -> Self {
        DateInput::Text(text)
    }
}

impl DateInput {
    fn resolve(self) -> Result<NaiveDate, AppError> {
        match self {
            DateInput::Date(date) => Ok(date),
            DateInput::Text(text) => parse_date(&text),
        }
    }
}

/// Parse a date that must look exactly like `YYYY-MM-DD`.
///
/// chrono alone accepts unpadded fields such as `2024-1-5`; the shape check
/// rejects those.
pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    let parse_error = || AppError::ParseError {
        value: value.to_string(),
        expected: DATE_FORMAT_HINT,
    };

    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(parse_error());
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| parse_error())
}

/// Inclusive calendar window; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: impl Into<DateInput>, end: impl Into<DateInput>) -> Result<Self, AppError> {
        let start = start.into().resolve()?;
        let end = end.into().resolve()?;
        if let Some(v) = check_order(start, end) {
            return Err(AppError::ValidationError(vec![v]));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Both bounds formatted as `YYYY-MM-DD`, keyed `start_date` / `end_date`.
    pub fn params(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("start_date", self.start.format(DATE_FORMAT).to_string()),
            ("end_date", self.end.format(DATE_FORMAT).to_string()),
        ])
    }
}

fn check_order(start: NaiveDate, end: NaiveDate) -> Option<Violation> {
    (start > end).then_some(Violation::DateOrder { start, end })
}

/// Ordered, validated sequence of canonical categories.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobCategorySet(Vec<JobCategory>);

impl JobCategorySet {
    /// Validate every label. Unknown labels are all reported together, in
    /// order of first appearance.
    pub fn parse<S: AsRef<str>>(labels: &[S]) -> Result<Self, AppError> {
        let violations = unknown_categories(labels);
        if !violations.is_empty() {
            return Err(AppError::ValidationError(violations));
        }
        Ok(Self::from_known(labels))
    }

    // Callers must have checked `unknown_categories` first.
    fn from_known<S: AsRef<str>>(labels: &[S]) -> Self {
        Self(
            labels
                .iter()
                .filter_map(|l| l.as_ref().parse().ok())
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = JobCategory> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<JobCategory>> for JobCategorySet {
    fn from(categories: Vec<JobCategory>) -> Self {
        Self(categories)
    }
}

fn unknown_categories<S: AsRef<str>>(labels: &[S]) -> Vec<Violation> {
    let mut unknown: Vec<String> = Vec::new();
    for label in labels.iter().map(AsRef::as_ref) {
        if label.parse::<JobCategory>().is_err() && !unknown.iter().any(|u| u == label) {
            unknown.push(label.to_string());
        }
    }
    unknown.into_iter().map(Violation::UnknownCategory).collect()
}

/// Everything a backend needs to know about one crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRequest {
    date_range: DateRange,
    categories: JobCategorySet,
    location: String,
}

impl CrawlRequest {
    /// Validate raw input into a request.
    ///
    /// Malformed dates fail fast with [`AppError::ParseError`]. Date ordering
    /// and unknown categories are collected into one
    /// [`AppError::ValidationError`].
    pub fn new<S: AsRef<str>>(
        start: impl Into<DateInput>,
        end: impl Into<DateInput>,
        categories: &[S],
        location: impl Into<String>,
    ) -> Result<Self, AppError> {
        let start = start.into().resolve()?;
        let end = end.into().resolve()?;

        let mut violations: Vec<Violation> = check_order(start, end).into_iter().collect();
        violations.extend(unknown_categories(categories));
        if !violations.is_empty() {
            return Err(AppError::ValidationError(violations));
        }

        Ok(Self {
            date_range: DateRange { start, end },
            categories: JobCategorySet::from_known(categories),
            location: location.into(),
        })
    }

    /// Assemble a request from parts that are already validated.
    pub fn from_parts(
        date_range: DateRange,
        categories: JobCategorySet,
        location: impl Into<String>,
    ) -> Self {
        Self {
            date_range,
            categories,
            location: location.into(),
        }
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    pub fn categories(&self) -> &JobCategorySet {
        &self.categories
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}
