//! Error types for the crawling core.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Errors that can occur while driving a crawl.
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Failed to parse a response body.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// An awaited operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request handler returned an error.
    #[error("request handler failed: {0}")]
    RequestHandler(String),

    /// Navigation (page load) failed or timed out.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The response was blocked by the target (status in the session's blocked set).
    #[error("blocked by target: status {0}")]
    Blocked(u16),

    /// A browser process, plugin hook, or pool launch failed.
    #[error("browser infrastructure error: {0}")]
    Infrastructure(String),

    /// The backing request/session store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A user-declared unrecoverable error; the crawler shuts down on this.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// A named session could not be found in the pool.
    #[error("no session with id '{0}' in the pool")]
    SessionNotFound(String),

    /// The proxy configuration has no proxies to offer.
    #[error("no proxies configured")]
    NoProxies,

    /// `LaunchContext::extend` was called with a reserved key.
    #[error("'{0}' is a reserved launch context key")]
    ReservedLaunchKey(String),

    /// Generic error, for cases that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CrawlerError {
    /// Whether this error should count against a session's error score
    /// (§4.2 / §7 — navigation, blocked, infrastructure, and handler errors
    /// all imply something went wrong with the identity used, not just a
    /// one-off hiccup).
    pub fn taints_session(&self) -> bool {
        matches!(
            self,
            CrawlerError::Navigation(_)
                | CrawlerError::Blocked(_)
                | CrawlerError::Infrastructure(_)
                | CrawlerError::RequestHandler(_)
                | CrawlerError::Timeout(_)
        )
    }

    /// Whether a request that failed with this error should still consume a
    /// retry slot. Blocked-by-target reclaims without consuming the counter
    /// (§7); every other kind does.
    pub fn consumes_retry(&self) -> bool {
        !matches!(self, CrawlerError::Blocked(_))
    }
}
