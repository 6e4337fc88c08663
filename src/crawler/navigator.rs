//! The `Navigator` seam: how a crawler turns a `Request` into a loaded page.
//!
//! Generalizes the donor's `PageFetcher` (`fetcher.rs`/`fetcher_http.rs`):
//! where the donor had exactly two fetchers (plain HTTP, headless browser)
//! behind one `fetch(url) -> String` method, a crawler needs the method,
//! headers, cookies, and status code too, plus — for the browser variant —
//! to hand the live page back to the caller instead of closing it
//! immediately, since hooks and the request handler still need it open.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::browser::pool::BrowserPool;
use crate::browser::{LaunchContext, LaunchedPage};
use crate::error::{CrawlerError, Result};
use crate::proxy::ProxyInfo;
use crate::request::{Method, Request};

/// The pieces of a [`crate::session::Session`] a navigator actually needs.
/// Kept separate from `Session` itself because the session pool owns
/// sessions behind a lock keyed by id — handing out a live `&Session`
/// across the awaited navigation call would mean holding that lock for the
/// whole navigation.
pub struct NavigationSession {
    pub id: String,
    pub cookie_jar: std::sync::Arc<reqwest::cookie::Jar>,
}

/// Strategy for waiting until a page is considered fully loaded. Kept from
/// the donor's `fetcher.rs` unchanged; still only meaningful for
/// [`BrowserNavigator`].
#[derive(Debug, Clone, Default)]
pub enum WaitStrategy {
    #[default]
    Load,
    NetworkIdle {
        idle_ms: u64,
    },
    Selector {
        css: String,
        timeout_ms: u64,
    },
    Delay {
        ms: u64,
    },
}

/// An open page handle left live after navigation so hooks and the request
/// handler can act on it before the crawler core closes it.
pub enum PageHandle {
    Http { body: String },
    Browser { browser_id: String, page: Box<dyn LaunchedPage> },
}

impl PageHandle {
    pub async fn content(&self) -> Result<String> {
        match self {
            PageHandle::Http { body } => Ok(body.clone()),
            PageHandle::Browser { page, .. } => page.content().await,
        }
    }
}

pub struct NavigationResult {
    pub loaded_url: String,
    pub status_code: Option<u16>,
    pub page: PageHandle,
}

/// Turns a `Request` into an open [`PageHandle`]. `BasicCrawler` is
/// parameterized over [`HttpNavigator`], `BrowserCrawler` over
/// [`BrowserNavigator`] — both drive the same crawler core in `basic.rs`.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(
        &self,
        request: &Request,
        session: Option<&NavigationSession>,
        proxy: Option<&ProxyInfo>,
        timeout: Duration,
    ) -> Result<NavigationResult>;

    /// Best-effort teardown; errors are logged, not propagated, matching the
    /// donor's `BrowserFetcher::fetch` tail.
    async fn close(&self, page: PageHandle);
}

/// Plain HTTP navigation via `reqwest`, grounded on the donor's
/// `HttpFetcher` (`fetcher_http.rs`).
pub struct HttpNavigator {
    client: Client,
}

impl HttpNavigator {
    pub fn new() -> Self {
        HttpNavigator {
            client: Client::builder()
                .user_agent("Mozilla/5.0 (compatible; autoscrape/0.1)")
                .build()
                .expect("failed to build default reqwest client"),
        }
    }

    pub fn with_client(client: Client) -> Self {
        HttpNavigator { client }
    }
}

impl Default for HttpNavigator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    async fn navigate(
        &self,
        request: &Request,
        session: Option<&NavigationSession>,
        proxy: Option<&ProxyInfo>,
        timeout: Duration,
    ) -> Result<NavigationResult> {
        let client = if let Some(session) = session {
            // Route this request through the session's cookie jar / proxy
            // without mutating the navigator's shared client.
            let mut builder = Client::builder().cookie_provider(session.cookie_jar.clone());
            if let Some(proxy_info) = proxy {
                if let Ok(p) = reqwest::Proxy::all(&proxy_info.url) {
                    builder = builder.proxy(p);
                }
            }
            builder.build().unwrap_or_else(|_| self.client.clone())
        } else {
            self.client.clone()
        };

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
            Method::Put => client.put(&request.url),
            Method::Delete => client.delete(&request.url),
            Method::Head => client.head(&request.url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(payload) = &request.payload {
            builder = builder.body(payload.clone());
        }

        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| CrawlerError::Timeout(timeout))??;
        let status = response.status().as_u16();
        let loaded_url = response.url().to_string();
        debug!(url = %request.url, status, "http navigation complete");
        let body = response.text().await?;

        Ok(NavigationResult {
            loaded_url,
            status_code: Some(status),
            page: PageHandle::Http { body },
        })
    }

    async fn close(&self, _page: PageHandle) {}
}

/// Browser-backed navigation via a [`BrowserPool`], grounded on the donor's
/// `BrowserFetcher` (acquire tab -> optional UA override -> wait strategy ->
/// extract content).
pub struct BrowserNavigator {
    pool: std::sync::Arc<BrowserPool>,
    wait: WaitStrategy,
}

impl BrowserNavigator {
    pub fn new(pool: std::sync::Arc<BrowserPool>) -> Self {
        BrowserNavigator {
            pool,
            wait: WaitStrategy::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }
}

#[async_trait]
impl Navigator for BrowserNavigator {
    async fn navigate(
        &self,
        request: &Request,
        session: Option<&NavigationSession>,
        proxy: Option<&ProxyInfo>,
        timeout: Duration,
    ) -> Result<NavigationResult> {
        let mut ctx = LaunchContext::new();
        if let Some(session) = session {
            ctx = ctx.with_session_id(session.id.clone());
        }
        if let Some(proxy) = proxy {
            ctx = ctx.with_proxy_url(proxy.url.clone());
        }

        let (browser_id, page) = self.pool.acquire_page(ctx).await?;

        tokio::time::timeout(timeout, page.goto(&request.url))
            .await
            .map_err(|_| CrawlerError::Timeout(timeout))??;

        match &self.wait {
            WaitStrategy::Load => {
                page.wait_for_navigation().await?;
            }
            WaitStrategy::NetworkIdle { idle_ms } => {
                page.wait_for_navigation().await?;
                tokio::time::sleep(Duration::from_millis(*idle_ms)).await;
            }
            WaitStrategy::Selector { css, timeout_ms } => {
                // Best-effort: the donor treats a missing selector as
                // "proceed with whatever loaded" rather than a hard error,
                // since it may legitimately be a CAPTCHA/error page.
                let deadline = Instant::now() + Duration::from_millis(*timeout_ms);
                let selector = Selector::parse(css).ok();
                loop {
                    if let Some(selector) = &selector {
                        if let Ok(content) = page.content().await {
                            if Html::parse_document(&content).select(selector).next().is_some() {
                                break;
                            }
                        }
                    }
                    if Instant::now() >= deadline {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
            WaitStrategy::Delay { ms } => {
                page.wait_for_navigation().await?;
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
        }

        let status_code = page.last_response_status().await;

        Ok(NavigationResult {
            loaded_url: request.url.clone(),
            status_code,
            page: PageHandle::Browser { browser_id, page },
        })
    }

    async fn close(&self, page: PageHandle) {
        if let PageHandle::Browser { browser_id, page } = page {
            self.pool.release_page(&browser_id, page).await;
        }
    }
}
