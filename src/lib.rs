//! # autoscrape
//!
//! A crawling core: request queues, session/proxy rotation, an autoscaling
//! concurrency scheduler, and a pooled-browser crawler, factored so the same
//! orchestration loop drives both plain-HTTP and headless-browser crawls.
//!
//! - Deduplicated, retryable [`RequestQueue`] and finite [`RequestList`] work
//!   sources
//! - [`SessionPool`] with usage/error scoring and automatic retirement
//! - [`ProxyConfiguration`] with session-sticky rotation
//! - [`Snapshotter`]/[`SystemStatus`] overload detection feeding
//!   [`AutoscaledPool`]'s cooperative concurrency scheduler
//! - [`BrowserPool`] managing many browsers' lifecycles, page budgets, and
//!   fingerprints
//! - [`BasicCrawler`] and [`BrowserCrawler`], sharing one generic core
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use autoscrape::{CrawlerHandles, CrawlerOptions, Request, RequestQueue, RunnableTasks};
//! use autoscrape::crawler::BasicCrawler;
//!
//! #[tokio::main]
//! async fn main() -> autoscrape::Result<()> {
//!     let queue = Arc::new(RequestQueue::new_in_memory());
//!     queue.add_request(Request::new("https://example.com"), false).await?;
//!     let handles = Arc::new(CrawlerHandles::in_memory());
//!
//!     let crawler = BasicCrawler::new_basic(
//!         queue,
//!         handles,
//!         CrawlerOptions::default(),
//!         Box::new(|ctx| {
//!             Box::pin(async move {
//!                 ctx.push_data(serde_json::json!({"url": ctx.request.url})).await
//!             })
//!         }),
//!     );
//!     crawler.run_task().await?;
//!     Ok(())
//! }
//! ```

mod autoscaled_pool;
mod config;
mod dataset;
mod error;
mod events;
mod proxy;
mod request;
mod request_list;
mod request_queue;
mod session;
mod session_pool;
mod storage;
mod system_status;

pub mod browser;
pub mod crawler;

pub use autoscaled_pool::{AutoscaledPool, AutoscaledPoolOptions, PoolStats, RunnableTasks};
pub use config::{BrowserPoolOptions, Configuration, CrawlerOptions};
pub use dataset::{Dataset, InMemoryDataset, InMemoryKeyValueStore, KeyValueStore, KeyValueStoreRegistry};
pub use error::{CrawlerError, Result};
pub use events::{Event, EventBus};
pub use proxy::{ProxyConfig, ProxyConfiguration, ProxyInfo, ProxyProtocol, ProxyProvider, ProxyStrategy, StaticProxyProvider};
pub use request::{Method, Request, RequestState};
pub use request_list::{RequestList, RequestListState};
pub use request_queue::{AddRequestInfo, RequestQueue};
pub use session::Session;
pub use session_pool::{SessionPool, SessionPoolOptions};
pub use storage::{InMemoryRequestStorage, RequestStorageClient};
pub use system_status::{Snapshot, Snapshotter, SnapshotterOptions, SystemStatus};

pub use crawler::{BasicCrawler, BrowserCrawler, CancellationToken, CrawlerHandles};
