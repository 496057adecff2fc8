use std::sync::Arc;

use htmd::HtmlToMarkdown;
use jobcrawl_core::error::AppError;
use jobcrawl_core::traits::Cleaner;

/// HTML-to-Markdown cleaner using htmd.
///
/// Turns a job description fragment into readable Markdown, dropping
/// page chrome, scripts, forms and embedded media.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form", "button", "img",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|md| md.trim().to_string())
            .map_err(|e| AppError::FetchError(format!("Failed to convert description: {e}")))
    }
}
