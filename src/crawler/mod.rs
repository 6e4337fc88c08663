//! The crawling core: one generic orchestration loop (`basic`) driven by two
//! `Navigator` bindings (`HttpNavigator` for [`basic::BasicCrawler`],
//! `BrowserNavigator` for [`browser_crawler::BrowserCrawler`]).

pub mod basic;
pub mod browser_crawler;
pub mod context;
pub mod enqueue_links;
pub mod hooks;
pub mod navigator;

pub use basic::{BasicCrawler, Crawler, FailedRequestHandler, RequestHandler};
pub use browser_crawler::BrowserCrawler;
pub use context::{CancellationToken, CrawlerHandles, CrawlingContext};
pub use enqueue_links::EnqueueLinksOptions;
pub use hooks::Hooks;
pub use navigator::{BrowserNavigator, HttpNavigator, NavigationResult, NavigationSession, Navigator, PageHandle, WaitStrategy};
