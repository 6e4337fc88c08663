//! Link extraction for `CrawlingContext::enqueue_links`.
//!
//! Grounded on the donor's `result.rs` HTML-adjacent parsing style
//! (building typed values out of scraped text) generalized to extracting
//! `<a href>` targets instead of search-result fields, using `scraper` — the
//! crate the donor already depends on for HTML traversal.

use scraper::{Html, Selector};
use url::Url;

use crate::error::{CrawlerError, Result};

/// Tuning for `CrawlingContext::enqueue_links`. `None` selector defaults to
/// `a[href]`; `same_domain_only` filters out links that escape the page's
/// registrable host, a common crawl-scoping need the original distillation
/// didn't call out but every real crawler exposes.
#[derive(Debug, Clone)]
pub struct EnqueueLinksOptions {
    pub selector: String,
    pub label: Option<String>,
    pub same_domain_only: bool,
}

impl Default for EnqueueLinksOptions {
    fn default() -> Self {
        EnqueueLinksOptions {
            selector: "a[href]".to_string(),
            label: None,
            same_domain_only: true,
        }
    }
}

/// Extracts and resolves every link matching `options.selector` against
/// `base_url`, deduplicating within the page itself.
pub fn extract_links(html: &str, base_url: &Url, options: &EnqueueLinksOptions) -> Result<Vec<Url>> {
    let selector = Selector::parse(&options.selector)
        .map_err(|e| CrawlerError::Parse(format!("invalid selector '{}': {e:?}", options.selector)))?;
    let document = Html::parse_document(html);

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        if options.same_domain_only && resolved.host_str() != base_url.host_str() {
            continue;
        }
        if seen.insert(resolved.to_string()) {
            links.push(resolved);
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_absolute_and_relative_links() {
        let html = r#"<a href="/a">a</a><a href="https://other.com/b">b</a>"#;
        let base = Url::parse("https://example.com/page").unwrap();
        let links = extract_links(html, &base, &EnqueueLinksOptions {
            same_domain_only: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].as_str(), "https://example.com/a");
    }

    #[test]
    fn test_same_domain_only_filters_cross_domain_links() {
        let html = r#"<a href="/a">a</a><a href="https://other.com/b">b</a>"#;
        let base = Url::parse("https://example.com/page").unwrap();
        let links = extract_links(html, &base, &EnqueueLinksOptions::default()).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://example.com/a");
    }

    #[test]
    fn test_dedupes_repeated_links() {
        let html = r#"<a href="/a">a</a><a href="/a">again</a>"#;
        let base = Url::parse("https://example.com/page").unwrap();
        let links = extract_links(html, &base, &EnqueueLinksOptions::default()).unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        let base = Url::parse("https://example.com").unwrap();
        let result = extract_links("<html></html>", &base, &EnqueueLinksOptions {
            selector: "::::".to_string(),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
