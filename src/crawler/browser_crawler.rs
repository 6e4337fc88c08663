//! `BrowserCrawler`: the same crawler core as [`crate::crawler::basic`], bound
//! to [`BrowserNavigator`] so every request is loaded through a pooled
//! headless browser instead of a plain HTTP client (§4.6/§4.7).

use std::sync::Arc;

use crate::browser::BrowserPool;
use crate::config::CrawlerOptions;
use crate::crawler::basic::{Crawler, RequestHandler};
use crate::crawler::context::CrawlerHandles;
use crate::crawler::navigator::BrowserNavigator;
use crate::request_queue::RequestQueue;

pub type BrowserCrawler = Crawler<BrowserNavigator>;

impl BrowserCrawler {
    pub fn new_browser(
        browser_pool: Arc<BrowserPool>,
        request_queue: Arc<RequestQueue>,
        handles: Arc<CrawlerHandles>,
        options: CrawlerOptions,
        request_handler: RequestHandler,
    ) -> Self {
        Crawler::new(
            Arc::new(BrowserNavigator::new(browser_pool)),
            request_queue,
            handles,
            options,
            request_handler,
        )
    }
}
