//! The crawling context: one object per request, shared across every hook
//! and the request handler for that request (§6 External Interfaces).
//!
//! Modeled as a struct with `Option` fields rather than an untyped
//! dictionary — `session`/`proxy_info`/`page` are populated once navigation
//! starts; `BasicCrawler` never populates `page` with a `PageHandle::Browser`
//! variant, `BrowserCrawler` never leaves `page` as `PageHandle::Http` after
//! a successful navigation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::crawler::enqueue_links::{extract_links, EnqueueLinksOptions};
use crate::crawler::navigator::PageHandle;
use crate::dataset::{Dataset, InMemoryDataset, KeyValueStore, KeyValueStoreRegistry};
use crate::error::{CrawlerError, Result};
use crate::proxy::ProxyInfo;
use crate::request::Request;
use crate::request_queue::RequestQueue;
use crate::session::Session;

/// The collaborators a crawling context needs to fulfil
/// `push_data`/`enqueue_links`/`add_requests`/`get_key_value_store`, bundled
/// once per crawler run and cheaply cloned (all `Arc`) into every context.
pub struct CrawlerHandles {
    pub dataset: Arc<dyn Dataset>,
    pub kv_store: Arc<KeyValueStoreRegistry>,
    pub request_queue: Option<Arc<RequestQueue>>,
}

impl CrawlerHandles {
    pub fn new(dataset: Arc<dyn Dataset>, kv_store: Arc<KeyValueStoreRegistry>, request_queue: Option<Arc<RequestQueue>>) -> Self {
        CrawlerHandles {
            dataset,
            kv_store,
            request_queue,
        }
    }

    /// Convenience constructor for tests and small crawls: in-memory dataset
    /// and key-value registry, no request queue (so `add_requests` errors).
    pub fn in_memory() -> Self {
        CrawlerHandles {
            dataset: Arc::new(InMemoryDataset::default()),
            kv_store: Arc::new(KeyValueStoreRegistry::new()),
            request_queue: None,
        }
    }

    pub fn with_request_queue(mut self, queue: Arc<RequestQueue>) -> Self {
        self.request_queue = Some(queue);
        self
    }
}

/// A cooperative cancellation flag threaded through a crawling context.
/// Every awaited step in the crawler core checks it on resume rather than
/// the crawler preempting a task mid-await.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CrawlingContext {
    pub id: String,
    pub request: Request,
    pub session: Option<Session>,
    pub proxy_info: Option<ProxyInfo>,
    pub page: Option<PageHandle>,
    pub status_code: Option<u16>,
    pub loaded_url: Option<String>,
    pub cancellation: CancellationToken,
    handles: Arc<CrawlerHandles>,
}

impl CrawlingContext {
    pub fn new(request: Request, handles: Arc<CrawlerHandles>) -> Self {
        CrawlingContext {
            id: Uuid::new_v4().to_string(),
            request,
            session: None,
            proxy_info: None,
            page: None,
            status_code: None,
            loaded_url: None,
            cancellation: CancellationToken::new(),
            handles,
        }
    }

    pub async fn push_data(&self, item: serde_json::Value) -> Result<()> {
        self.handles.dataset.push_data(item).await
    }

    pub async fn get_key_value_store(&self, id: Option<&str>) -> Arc<dyn KeyValueStore> {
        self.handles.kv_store.get_or_create(id).await
    }

    /// Adds requests to the crawler's request queue, if one is configured.
    pub async fn add_requests(&self, requests: Vec<Request>) -> Result<()> {
        let queue = self
            .handles
            .request_queue
            .as_ref()
            .ok_or_else(|| CrawlerError::Storage("no request queue configured for this crawl".into()))?;
        for request in requests {
            queue.add_request(request, false).await?;
        }
        Ok(())
    }

    /// Extracts links from the current page's content and enqueues them,
    /// per §6. Requires both an open page and a request queue.
    pub async fn enqueue_links(&self, options: EnqueueLinksOptions) -> Result<usize> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| CrawlerError::RequestHandler("enqueue_links called with no open page".into()))?;
        let html = page.content().await?;
        let base = self
            .loaded_url
            .as_deref()
            .unwrap_or(&self.request.url);
        let base_url = Url::parse(base).map_err(CrawlerError::UrlParse)?;

        let links = extract_links(&html, &base_url, &options)?;
        let requests: Vec<Request> = links
            .into_iter()
            .map(|url| {
                let mut request = Request::new(url.to_string());
                if let Some(label) = &options.label {
                    request = request.with_label(label.clone());
                }
                request
            })
            .collect();
        let count = requests.len();
        self.add_requests(requests).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_queue() -> (CrawlingContext, Arc<RequestQueue>) {
        let queue = Arc::new(RequestQueue::new_in_memory());
        let handles = Arc::new(CrawlerHandles::in_memory().with_request_queue(queue.clone()));
        let ctx = CrawlingContext::new(Request::new("https://example.com/start"), handles);
        (ctx, queue)
    }

    #[tokio::test]
    async fn test_push_data_stores_item() {
        let (ctx, _queue) = ctx_with_queue();
        ctx.push_data(serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(ctx.handles.dataset.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_requests_without_queue_errors() {
        let handles = Arc::new(CrawlerHandles::in_memory());
        let ctx = CrawlingContext::new(Request::new("https://example.com"), handles);
        let result = ctx.add_requests(vec![Request::new("https://example.com/x")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_enqueue_links_without_page_errors() {
        let (ctx, _queue) = ctx_with_queue();
        let result = ctx.enqueue_links(EnqueueLinksOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_enqueue_links_adds_to_queue() {
        let (mut ctx, queue) = ctx_with_queue();
        ctx.page = Some(PageHandle::Http {
            body: r#"<a href="/next">next</a>"#.to_string(),
        });
        ctx.loaded_url = Some("https://example.com/start".to_string());
        let count = ctx.enqueue_links(EnqueueLinksOptions::default()).await.unwrap();
        assert_eq!(count, 1);
        assert!(!queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_key_value_store_returns_same_store_for_same_id() {
        let (ctx, _queue) = ctx_with_queue();
        let a = ctx.get_key_value_store(Some("shared")).await;
        a.set("k", serde_json::json!(1)).await.unwrap();
        let b = ctx.get_key_value_store(Some("shared")).await;
        assert_eq!(b.get("k").await.unwrap(), Some(serde_json::json!(1)));
    }
}
