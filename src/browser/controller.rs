//! One launched automation browser and its `launching -> active -> retired
//! -> closed` state machine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::browser::launch_context::LaunchContext;
use crate::error::Result;

/// One open page/tab, abstracted over the concrete browser binding. The
/// navigation-facing methods mirror the donor's `BrowserFetcher::fetch` body
/// (`new_page` -> optional UA override -> wait strategy -> `content()`) so
/// `crawler::navigator` can drive either a browser or a plain HTTP client
/// through one seam.
#[async_trait]
pub trait LaunchedPage: Send + Sync {
    fn id(&self) -> String;
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn wait_for_navigation(&self) -> Result<()>;
    async fn content(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;

    /// The HTTP status of the last main-document response observed on this
    /// page, if any. Bindings that can't observe network responses (or
    /// haven't navigated yet) return `None`.
    async fn last_response_status(&self) -> Option<u16> {
        None
    }
}

/// One launched browser process, abstracted over the concrete binding so
/// [`BrowserController`]/[`super::pool::BrowserPool`] bookkeeping can be
/// tested without spawning a real browser — the same seam the donor already
/// draws between `BrowserPool` (process bookkeeping) and `PageFetcher`
/// (content extraction).
#[async_trait]
pub trait LaunchedBrowser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn LaunchedPage>>;
    async fn close(&self) -> Result<()>;
}

/// Launches a browser given a [`LaunchContext`]. The default binding is
/// `chromiumoxide` (feature `headless`); tests substitute a mock so pool
/// bookkeeping is exercised without a real process.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, ctx: &LaunchContext) -> Result<Box<dyn LaunchedBrowser>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Launching,
    Active,
    Retired,
    Closed,
}

/// One launched browser, its launch context, and page accounting.
pub struct BrowserController {
    pub id: String,
    pub launch_context: LaunchContext,
    launched: Box<dyn LaunchedBrowser>,
    pub active_pages: u32,
    pub total_pages: u32,
    pub last_page_opened_at: Instant,
    state: BrowserState,
}

impl BrowserController {
    pub fn new(launch_context: LaunchContext, launched: Box<dyn LaunchedBrowser>) -> Self {
        BrowserController {
            id: Uuid::new_v4().to_string(),
            launch_context,
            launched,
            active_pages: 0,
            total_pages: 0,
            last_page_opened_at: Instant::now(),
            state: BrowserState::Launching,
        }
    }

    pub fn state(&self) -> BrowserState {
        self.state
    }

    /// Transition out of `Launching`. The pool guarantees this is only
    /// called after post-launch hooks complete (§4.6).
    pub fn activate(&mut self) {
        if self.state == BrowserState::Launching {
            self.state = BrowserState::Active;
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == BrowserState::Active
    }

    pub fn is_retired(&self) -> bool {
        matches!(self.state, BrowserState::Retired | BrowserState::Closed)
    }

    pub fn can_open_page(&self, max_open_pages_per_browser: u32) -> bool {
        self.is_active() && self.active_pages < max_open_pages_per_browser
    }

    /// Whether this browser should retire immediately after the page it
    /// just opened, per the `retire_browser_after_page_count` trigger.
    pub fn exceeds_page_budget(&self, retire_after_page_count: u32) -> bool {
        self.total_pages >= retire_after_page_count
    }

    pub async fn open_page(&mut self) -> Result<Box<dyn LaunchedPage>> {
        let page = self.launched.new_page().await?;
        self.total_pages += 1;
        self.active_pages += 1;
        self.last_page_opened_at = Instant::now();
        Ok(page)
    }

    /// Decrements the active count. Never goes below zero even if called
    /// more than once for the same close (the pool's page-close wrap is
    /// responsible for idempotency at the event-emission level; this is
    /// just the saturating counter).
    pub fn record_page_closed(&mut self) {
        self.active_pages = self.active_pages.saturating_sub(1);
    }

    pub fn retire(&mut self) {
        if !self.is_retired() {
            self.state = BrowserState::Retired;
        }
    }

    pub fn is_closable(&self, close_inactive_after: Duration) -> bool {
        self.state == BrowserState::Retired
            && (self.active_pages == 0 || self.last_page_opened_at.elapsed() > close_inactive_after)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.launched.close().await?;
        self.state = BrowserState::Closed;
        Ok(())
    }
}
