//! The unit of crawl work and its state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where a [`Request`] sits in the per-request lifecycle.
///
/// Transitions only move forward except for the retry path, which resets a
/// request to `Unprocessed` via [`crate::request_queue::RequestQueue::reclaim_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Unprocessed,
    BeforeNav,
    AfterNav,
    RequestHandler,
    Done,
    Error,
}

/// HTTP method for a request. Only the methods the crawling core actually
/// dispatches; anything more exotic is a handler's own concern via the raw
/// `reqwest::Client` exposed on the crawling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

/// One unit of crawl work.
///
/// `unique_key` is the dedup identity; two requests with the same
/// `unique_key` are the same work item regardless of other field
/// differences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    pub unique_key: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub payload: Option<Vec<u8>>,
    pub user_data: serde_json::Value,
    pub label: Option<String>,
    pub retry_count: u32,
    pub error_messages: Vec<String>,
    pub loaded_url: Option<String>,
    pub state: RequestState,
    pub skip_navigation: bool,
    pub no_retry: bool,
}

impl Request {
    /// Build a new request. `unique_key` defaults to the normalized URL
    /// (trailing slash stripped, no fragment) unless overridden with
    /// [`Request::with_unique_key`].
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let unique_key = normalize_url(&url);
        Request {
            url,
            unique_key,
            method: Method::Get,
            headers: HashMap::new(),
            payload: None,
            user_data: serde_json::Value::Null,
            label: None,
            retry_count: 0,
            error_messages: Vec::new(),
            loaded_url: None,
            state: RequestState::Unprocessed,
            skip_navigation: false,
            no_retry: false,
        }
    }

    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = key.into();
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_user_data(mut self, data: serde_json::Value) -> Self {
        self.user_data = data;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn skip_navigation(mut self) -> Self {
        self.skip_navigation = true;
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.no_retry = true;
        self
    }

    /// Record a failed attempt: bumps `retry_count` and appends the message.
    /// Does not touch `state` — the caller decides whether this is a
    /// reclaim or a terminal failure.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.retry_count += 1;
        self.error_messages.push(message.into());
    }
}

/// Normalize a URL into a stable dedup key: strips the fragment and a single
/// trailing slash. Kept intentionally simple — the crate does not attempt
/// full URL canonicalization (query-param reordering, case-folding of the
/// host beyond what `url` already does).
pub fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut u) => {
            u.set_fragment(None);
            let mut s = u.to_string();
            if s.ends_with('/') && s.matches('/').count() > 2 {
                s.pop();
            }
            s
        }
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}
