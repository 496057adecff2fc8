use std::collections::BTreeMap;
use std::path::Path;

use jobcrawl_core::error::AppError;
use jobcrawl_core::request::JobCategory;
use scraper::Selector;
use serde::Deserialize;
use url::Url;

/// Description of a server-rendered job board, loaded from JSON.
///
/// ```json
/// {
///   "name": "example-board",
///   "search_url": "https://jobs.example.com/search",
///   "location_param": "where",
///   "start_date_param": "posted_from",
///   "end_date_param": "posted_to",
///   "page_size": 20,
///   "categories": { "Cybersecurity": "infosec" },
///   "listing_selector": "article.job a.title",
///   "fields": { "title": "h1", "company": ".company" },
///   "description_selector": "section.description"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BoardProfile {
    pub name: String,
    pub search_url: String,
    /// Repeated once per mapped category.
    #[serde(default = "default_category_param")]
    pub category_param: String,
    #[serde(default)]
    pub location_param: Option<String>,
    #[serde(default)]
    pub start_date_param: Option<String>,
    #[serde(default)]
    pub end_date_param: Option<String>,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Value of `page_param` on the first results page.
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Listings per full page; a shorter page is treated as the last one.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Canonical category -> site term.
    pub categories: BTreeMap<JobCategory, String>,
    /// Matches links (or elements containing a link) to detail pages.
    pub listing_selector: String,
    /// Field name -> selector whose text becomes the field value.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Converted to Markdown and stored as `description`.
    #[serde(default)]
    pub description_selector: Option<String>,
}

fn default_category_param() -> String {
    "category".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_first_page() -> u32 {
    1
}

impl BoardProfile {
    /// Read and validate a profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read profile {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let profile: BoardProfile = serde_json::from_str(raw)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check that the search URL and every selector parse.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ConfigError("profile name must not be empty".into()));
        }
        Url::parse(&self.search_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid search_url '{}': {e}", self.search_url))
        })?;
        if self.page_size == Some(0) {
            return Err(AppError::ConfigError("page_size must be at least 1".into()));
        }

        parse_selector("listing_selector", &self.listing_selector)?;
        for (field, selector) in &self.fields {
            parse_selector(field, selector)?;
        }
        if let Some(selector) = &self.description_selector {
            parse_selector("description_selector", selector)?;
        }
        Ok(())
    }
}

pub(crate) fn parse_selector(what: &str, selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector).map_err(|e| {
        AppError::ConfigError(format!("Invalid selector for {what} '{selector}': {e}"))
    })
}
