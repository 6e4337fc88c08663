//! A single explicit configuration value threaded into every constructor.
//!
//! No part of the crawling core reads process-wide/global state (§9 Design
//! Notes); callers build one `Configuration` and pass it (or the pieces they
//! need) into the components they construct. Builder style follows the
//! donor's `EngineConfig`/`ProxyConfig`/`SearchQuery` (`with_*` methods
//! returning `Self`).

use std::time::Duration;

use serde::Deserialize;

use crate::autoscaled_pool::AutoscaledPoolOptions;
use crate::session_pool::SessionPoolOptions;
use crate::system_status::SnapshotterOptions;

/// Crawler-facing options, per the table in §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerOptions {
    pub max_request_retries: u32,
    pub max_requests_per_crawl: Option<u64>,
    pub navigation_timeout: Duration,
    pub request_handler_timeout: Duration,
    pub use_session_pool: bool,
    pub persist_cookies_per_session: bool,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        CrawlerOptions {
            max_request_retries: 3,
            max_requests_per_crawl: None,
            navigation_timeout: Duration::from_secs(60),
            request_handler_timeout: Duration::from_secs(60),
            use_session_pool: true,
            persist_cookies_per_session: true,
        }
    }
}

/// Browser-variant-only options (§4.6, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserPoolOptions {
    pub max_open_pages_per_browser: u32,
    pub retire_browser_after_page_count: u32,
    pub close_inactive_browser_after: Duration,
    pub idle_sweep_interval: Duration,
    pub fingerprinting_enabled: bool,
    pub fingerprint_cache_size: usize,
    pub headless: bool,
}

impl Default for BrowserPoolOptions {
    fn default() -> Self {
        BrowserPoolOptions {
            max_open_pages_per_browser: 20,
            retire_browser_after_page_count: 100,
            close_inactive_browser_after: Duration::from_secs(300),
            idle_sweep_interval: Duration::from_secs(10),
            fingerprinting_enabled: true,
            fingerprint_cache_size: 10_000,
            headless: true,
        }
    }
}

/// Aggregates every tunable named across §4.1-4.7 and §6 into one value.
/// Derives `Deserialize` so a deployment can load it from a config file
/// (TOML/JSON/etc. via whichever `serde` format crate it picks) and layer
/// `with_*` overrides from flags or env on top, rather than needing bespoke
/// parsing per tunable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub crawler: CrawlerOptions,
    pub autoscaled_pool: AutoscaledPoolOptions,
    pub session_pool: SessionPoolOptions,
    pub browser_pool: BrowserPoolOptions,
    pub snapshotter: SnapshotterOptions,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crawler(mut self, opts: CrawlerOptions) -> Self {
        self.crawler = opts;
        self
    }

    pub fn with_autoscaled_pool(mut self, opts: AutoscaledPoolOptions) -> Self {
        self.autoscaled_pool = opts;
        self
    }

    pub fn with_session_pool(mut self, opts: SessionPoolOptions) -> Self {
        self.session_pool = opts;
        self
    }

    pub fn with_browser_pool(mut self, opts: BrowserPoolOptions) -> Self {
        self.browser_pool = opts;
        self
    }

    pub fn with_max_request_retries(mut self, n: u32) -> Self {
        self.crawler.max_request_retries = n;
        self
    }

    pub fn with_max_requests_per_crawl(mut self, n: u64) -> Self {
        self.crawler.max_requests_per_crawl = Some(n);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.autoscaled_pool.max_concurrency = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_matches_spec_defaults() {
        let config = Configuration::default();
        assert_eq!(config.crawler.max_request_retries, 3);
        assert_eq!(config.crawler.navigation_timeout, Duration::from_secs(60));
        assert_eq!(config.autoscaled_pool.scale_up_step_ratio, 0.05);
        assert_eq!(config.browser_pool.retire_browser_after_page_count, 100);
    }

    #[test]
    fn test_builder_overrides_apply() {
        let config = Configuration::new()
            .with_max_request_retries(5)
            .with_max_requests_per_crawl(100)
            .with_max_concurrency(50);
        assert_eq!(config.crawler.max_request_retries, 5);
        assert_eq!(config.crawler.max_requests_per_crawl, Some(100));
        assert_eq!(config.autoscaled_pool.max_concurrency, 50);
    }
}
