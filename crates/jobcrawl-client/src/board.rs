use jobcrawl_core::error::AppError;
use jobcrawl_core::models::{JobListingRef, JobRecord, PageCursor};
use jobcrawl_core::request::{CrawlRequest, JobCategory};
use jobcrawl_core::traits::{Cleaner, Fetcher, SiteBackend};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::profile::{BoardProfile, parse_selector};

struct Selectors {
    listing: Selector,
    link: Selector,
    fields: Vec<(String, Selector)>,
    description: Option<Selector>,
}

/// [`SiteBackend`] for any board described by a [`BoardProfile`].
///
/// Search pages are addressed purely by query parameters, so the URL of page
/// `n` is a function of the request and `n` alone.
pub struct HtmlBoardBackend<F: Fetcher, C: Cleaner> {
    profile: BoardProfile,
    selectors: Selectors,
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> HtmlBoardBackend<F, C> {
    pub fn new(profile: BoardProfile, fetcher: F, cleaner: C) -> Result<Self, AppError> {
        profile.validate()?;

        let selectors = Selectors {
            listing: parse_selector("listing_selector", &profile.listing_selector)?,
            link: parse_selector("link", "a[href]")?,
            fields: profile
                .fields
                .iter()
                .map(|(name, sel)| Ok((name.clone(), parse_selector(name, sel)?)))
                .collect::<Result<_, AppError>>()?,
            description: profile
                .description_selector
                .as_deref()
                .map(|sel| parse_selector("description_selector", sel))
                .transpose()?,
        };

        Ok(Self {
            profile,
            selectors,
            fetcher,
            cleaner,
        })
    }

    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    /// Search URL for 1-based page `page`.
    fn search_url(&self, request: &CrawlRequest, page: u32) -> Result<Url, AppError> {
        let terms = request
            .categories()
            .iter()
            .map(|c| self.map_category(c))
            .collect::<Result<Vec<_>, _>>()?;
        let dates = request.date_range().params();

        let mut url = Url::parse(&self.profile.search_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid search_url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for term in &terms {
                query.append_pair(&self.profile.category_param, term);
            }
            if let Some(param) = &self.profile.location_param
                && !request.location().is_empty()
            {
                query.append_pair(param, request.location());
            }
            if let Some(param) = &self.profile.start_date_param {
                query.append_pair(param, &dates["start_date"]);
            }
            if let Some(param) = &self.profile.end_date_param {
                query.append_pair(param, &dates["end_date"]);
            }
            let page_value = self
                .profile
                .first_page
                .checked_add(page.saturating_sub(1))
                .ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "page {page} is out of range for first_page {}",
                        self.profile.first_page
                    ))
                })?;
            query.append_pair(&self.profile.page_param, &page_value.to_string());
        }
        Ok(url)
    }

    /// Detail links on a results page, resolved against the page URL.
    fn parse_listings(&self, html: &str, base: &Url) -> Vec<JobListingRef> {
        let document = Html::parse_document(html);
        let mut found: Vec<JobListingRef> = Vec::new();

        for element in document.select(&self.selectors.listing) {
            let Some(href) = self.link_of(element) else {
                tracing::debug!(page = %base, "Listing element without a link");
                continue;
            };
            let Ok(url) = base.join(href) else {
                tracing::debug!(%href, "Unresolvable listing link");
                continue;
            };
            let url = url.to_string();
            // Boards often link both the logo and the title to the same posting.
            if found.iter().any(|l| l.url == url) {
                continue;
            }
            let mut listing = JobListingRef::new(url);
            let title = text_of(element);
            if !title.is_empty() {
                listing = listing.with_title(title);
            }
            found.push(listing);
        }

        found
    }

    fn link_of<'a>(&self, element: ElementRef<'a>) -> Option<&'a str> {
        element.value().attr("href").or_else(|| {
            element
                .select(&self.selectors.link)
                .next()
                .and_then(|a| a.value().attr("href"))
        })
    }

    fn parse_details(&self, html: &str, listing: &JobListingRef) -> Result<JobRecord, AppError> {
        let document = Html::parse_document(html);
        let mut fields = Map::new();

        for (name, selector) in &self.selectors.fields {
            if let Some(element) = document.select(selector).next() {
                let text = text_of(element);
                if !text.is_empty() {
                    fields.insert(name.clone(), Value::String(text));
                }
            }
        }

        if let Some(selector) = &self.selectors.description
            && let Some(element) = document.select(selector).next()
        {
            let markdown = self.cleaner.clean(&element.inner_html())?;
            if !markdown.is_empty() {
                fields.insert("description".into(), Value::String(markdown));
            }
        }

        if fields.is_empty() {
            return Err(AppError::FetchError(format!(
                "no job fields found at {}",
                listing.url
            )));
        }
        if let Some(title) = &listing.title {
            fields
                .entry("title")
                .or_insert_with(|| Value::String(title.clone()));
        }

        Ok(JobRecord::new(listing.url.clone(), fields))
    }
}

impl<F: Fetcher, C: Cleaner> SiteBackend for HtmlBoardBackend<F, C> {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn generate_search_url(&self, request: &CrawlRequest) -> Result<Url, AppError> {
        self.search_url(request, 1)
    }

    async fn fetch_listing_page(
        &self,
        cursor: &PageCursor,
    ) -> Result<Vec<JobListingRef>, AppError> {
        let html = self.fetcher.fetch(cursor.url.as_str()).await?;
        let listings = self.parse_listings(&html, &cursor.url);
        tracing::debug!(page = cursor.page, found = listings.len(), "Parsed results page");
        Ok(listings)
    }

    async fn extract_details(&self, listing: &JobListingRef) -> Result<JobRecord, AppError> {
        let html = self.fetcher.fetch(&listing.url).await?;
        self.parse_details(&html, listing)
    }

    async fn next_page_url(
        &self,
        request: &CrawlRequest,
        cursor: &PageCursor,
    ) -> Result<Option<Url>, AppError> {
        if cursor.listings == 0 {
            return Ok(None);
        }
        if let Some(size) = self.profile.page_size
            && cursor.listings < size
        {
            return Ok(None);
        }
        self.search_url(request, cursor.page + 1).map(Some)
    }

    fn map_category(&self, category: JobCategory) -> Result<String, AppError> {
        self.profile
            .categories
            .get(&category)
            .cloned()
            .ok_or_else(|| AppError::MappingError {
                backend: self.profile.name.clone(),
                category: category.to_string(),
            })
    }
}

/// Whitespace-normalised text content of an element.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
