//! The generic crawler core shared by `BasicCrawler` and `BrowserCrawler`.
//!
//! Grounded on the donor's `search.rs` orchestration (`Search::search`: pick
//! collaborators, run one unit of work under a timeout, fold the outcome)
//! generalized from "run every engine once" to "run forever, pulling one
//! request at a time from a queue, retrying on failure" — the loop itself is
//! driven by `AutoscaledPool`, with `Crawler` supplying one `run_task`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use crate::autoscaled_pool::RunnableTasks;
use crate::config::CrawlerOptions;
use crate::crawler::context::{CancellationToken, CrawlerHandles, CrawlingContext};
use crate::crawler::hooks::Hooks;
use crate::crawler::navigator::{HttpNavigator, NavigationSession, Navigator};
use crate::error::{CrawlerError, Result};
use crate::proxy::ProxyConfiguration;
use crate::request::Request;
use crate::request_queue::RequestQueue;
use crate::session_pool::SessionPool;

pub type RequestHandler = Box<dyn for<'a> Fn(&'a mut CrawlingContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;
pub type FailedRequestHandler =
    Box<dyn for<'a> Fn(&'a mut CrawlingContext, &'a CrawlerError) -> BoxFuture<'a, ()> + Send + Sync>;

/// Drives one request at a time through session/proxy acquisition,
/// navigation, hooks, and the user handler, per §4.7. Generic over
/// [`Navigator`] so `BasicCrawler` (plain HTTP) and `BrowserCrawler`
/// (headless browser) share every line of retry/session/timeout bookkeeping.
pub struct Crawler<N: Navigator> {
    navigator: Arc<N>,
    request_queue: Arc<RequestQueue>,
    session_pool: Option<Arc<SessionPool>>,
    proxy_configuration: Option<Arc<ProxyConfiguration>>,
    hooks: Hooks,
    handles: Arc<CrawlerHandles>,
    options: CrawlerOptions,
    request_handler: RequestHandler,
    failed_request_handler: Option<FailedRequestHandler>,
    handled_count: AtomicU64,
    cancellation: CancellationToken,
}

impl<N: Navigator + 'static> Crawler<N> {
    pub fn new(
        navigator: Arc<N>,
        request_queue: Arc<RequestQueue>,
        handles: Arc<CrawlerHandles>,
        options: CrawlerOptions,
        request_handler: RequestHandler,
    ) -> Self {
        Crawler {
            navigator,
            request_queue,
            session_pool: None,
            proxy_configuration: None,
            hooks: Hooks::new(),
            handles,
            options,
            request_handler,
            failed_request_handler: None,
            handled_count: AtomicU64::new(0),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_session_pool(mut self, pool: Arc<SessionPool>) -> Self {
        self.session_pool = Some(pool);
        self
    }

    pub fn with_proxy_configuration(mut self, config: Arc<ProxyConfiguration>) -> Self {
        self.proxy_configuration = Some(config);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_failed_request_handler(mut self, handler: FailedRequestHandler) -> Self {
        self.failed_request_handler = Some(handler);
        self
    }

    pub fn handled_count(&self) -> u64 {
        self.handled_count.load(Ordering::SeqCst)
    }

    /// Requests cooperative cancellation: in-flight and future `run_task`
    /// calls on this crawler will reclaim their request at the next
    /// checkpoint instead of continuing.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    async fn acquire_session(&self) -> Option<NavigationSession> {
        if !self.options.use_session_pool {
            return None;
        }
        let pool = self.session_pool.as_ref()?;
        match pool.get_session(None).await {
            Ok(id) => {
                // With cookie persistence off, the request still rides a
                // scored session (retirement/blocked-detection/proxy
                // affinity all still apply) but through a throwaway jar
                // instead of the session's own, so nothing it picks up
                // carries over to that session's next use.
                let cookie_jar = if self.options.persist_cookies_per_session {
                    match pool.cookie_jar(&id).await {
                        Ok(jar) => jar,
                        Err(e) => {
                            warn!(error = %e, "crawler: failed to fetch session cookie jar");
                            return None;
                        }
                    }
                } else {
                    Arc::new(reqwest::cookie::Jar::default())
                };
                Some(NavigationSession { id, cookie_jar })
            }
            Err(e) => {
                warn!(error = %e, "crawler: failed to acquire session");
                None
            }
        }
    }

    /// Reclaims (within retry budget) or terminally fails a request,
    /// matching the retry/failed-handler path in §4.7 step 6.
    async fn handle_failure(&self, mut request: Request, error: CrawlerError) -> Result<()> {
        request.record_error(error.to_string());
        let retryable = error.consumes_retry() && !request.no_retry;
        if retryable && request.retry_count <= self.options.max_request_retries {
            self.request_queue.reclaim_request(request, false).await?;
            return Ok(());
        }

        if let Some(handler) = &self.failed_request_handler {
            let mut ctx = CrawlingContext::new(request.clone(), self.handles.clone());
            handler(&mut ctx, &error).await;
        }
        self.request_queue.mark_request_handled(&request).await?;
        self.handled_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl<N: Navigator + 'static> RunnableTasks for Crawler<N> {
    async fn is_task_ready(&self) -> bool {
        if let Some(max) = self.options.max_requests_per_crawl {
            if self.handled_count.load(Ordering::SeqCst) >= max {
                return false;
            }
        }
        !self.request_queue.is_empty().await.unwrap_or(true)
    }

    async fn is_finished(&self) -> bool {
        if let Some(max) = self.options.max_requests_per_crawl {
            if self.handled_count.load(Ordering::SeqCst) >= max {
                return true;
            }
        }
        self.request_queue.is_finished().await.unwrap_or(false)
    }

    async fn run_task(&self) -> Result<()> {
        let Some(mut request) = self.request_queue.fetch_next_request().await else {
            return Ok(());
        };

        let session = self.acquire_session().await;

        let proxy_info = if let Some(config) = &self.proxy_configuration {
            let session_id = session.as_ref().map(|s| s.id.as_str());
            match config.new_proxy_info(session_id).await {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(error = %e, "crawler: failed to acquire proxy");
                    None
                }
            }
        } else {
            None
        };

        let mut ctx = CrawlingContext::new(request.clone(), self.handles.clone());
        ctx.cancellation = self.cancellation.clone();
        ctx.proxy_info = proxy_info.clone();
        if let (Some(s), Some(pool)) = (&session, &self.session_pool) {
            ctx.session = pool.snapshot(&s.id).await.ok();
        }

        // Cooperative cancellation checkpoint: every awaited step above this
        // point (session/proxy acquisition) is cheap to abandon without
        // having opened a page yet.
        if ctx.cancellation.is_cancelled() {
            self.request_queue.reclaim_request(request, true).await?;
            return Ok(());
        }

        if !request.skip_navigation {
            if let Err(e) = self.hooks.run_pre_navigation(&mut ctx).await {
                if let (Some(s), Some(pool)) = (&session, &self.session_pool) {
                    let _ = pool.mark_bad(&s.id).await;
                }
                return self.handle_failure(request, e).await;
            }

            match self
                .navigator
                .navigate(&request, session.as_ref(), proxy_info.as_ref(), self.options.navigation_timeout)
                .await
            {
                Ok(nav) => {
                    request.loaded_url = Some(nav.loaded_url.clone());
                    ctx.loaded_url = Some(nav.loaded_url);
                    ctx.status_code = nav.status_code;
                    ctx.page = Some(nav.page);
                }
                Err(e) => {
                    if let (Some(s), Some(pool)) = (&session, &self.session_pool) {
                        let _ = pool.mark_bad(&s.id).await;
                    }
                    return self.handle_failure(request, e).await;
                }
            }

            if let Err(e) = self.hooks.run_post_navigation(&mut ctx).await {
                if let Some(page) = ctx.page.take() {
                    self.navigator.close(page).await;
                }
                return self.handle_failure(request, e).await;
            }
        }

        if let (Some(status), Some(s), Some(pool)) = (ctx.status_code, &session, &self.session_pool) {
            if pool.mark_blocked(&s.id, status).await.unwrap_or(false) {
                if let Some(page) = ctx.page.take() {
                    self.navigator.close(page).await;
                }
                // Blocked-by-target: reclaimed at the front, no extra retry
                // counter consumed per §7.
                self.request_queue.reclaim_request(request, true).await?;
                return Ok(());
            }
        }

        // Checkpoint again now that a page may be open: cancellation past
        // this point must close it before reclaiming.
        if ctx.cancellation.is_cancelled() {
            if let Some(page) = ctx.page.take() {
                self.navigator.close(page).await;
            }
            self.request_queue.reclaim_request(request, true).await?;
            return Ok(());
        }

        let handler_result = tokio::time::timeout(self.options.request_handler_timeout, (self.request_handler)(&mut ctx)).await;

        let outcome = match handler_result {
            Ok(inner) => inner,
            Err(_) => Err(CrawlerError::Timeout(self.options.request_handler_timeout)),
        };

        if let Some(page) = ctx.page.take() {
            self.navigator.close(page).await;
        }

        match outcome {
            Ok(()) => {
                if let (Some(s), Some(pool)) = (&session, &self.session_pool) {
                    let _ = pool.mark_good(&s.id).await;
                }
                self.request_queue.mark_request_handled(&request).await?;
                self.handled_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                if let (Some(s), Some(pool)) = (&session, &self.session_pool) {
                    let _ = pool.mark_bad(&s.id).await;
                }
                self.handle_failure(request, e).await
            }
        }
    }
}

/// `BasicCrawler`: navigates with plain HTTP requests, no browser. Matches
/// the donor's non-headless search-engine path (`HttpFetcher`).
pub type BasicCrawler = Crawler<HttpNavigator>;

impl BasicCrawler {
    pub fn new_basic(
        request_queue: Arc<RequestQueue>,
        handles: Arc<CrawlerHandles>,
        options: CrawlerOptions,
        request_handler: RequestHandler,
    ) -> Self {
        Crawler::new(Arc::new(HttpNavigator::new()), request_queue, handles, options, request_handler)
    }
}
