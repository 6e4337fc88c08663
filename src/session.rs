//! A reusable identity context: cookies, user-agent, and a retirement score.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::cookie::Jar;
use url::Url;
use uuid::Uuid;

/// Identity context handed to requests so a target site sees a consistent
/// visitor across retries. Mirrors the donor's per-client cookie handling
/// (`reqwest::Client` built with a [`Jar`]) but adds the usage/error scoring
/// and retirement the crawling core needs.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub user_agent: String,
    cookie_jar: Arc<Jar>,
    pub usage_count: u32,
    pub max_usage_count: u32,
    pub error_score: f64,
    pub max_error_score: f64,
    pub blocked_status_codes: HashSet<u16>,
    retired: bool,
}

impl Session {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Session {
            id: Uuid::new_v4().to_string(),
            user_agent: user_agent.into(),
            cookie_jar: Arc::new(Jar::default()),
            usage_count: 0,
            max_usage_count: 50,
            error_score: 0.0,
            max_error_score: 3.0,
            blocked_status_codes: [401, 403, 429].into_iter().collect(),
            retired: false,
        }
    }

    pub fn with_max_usage_count(mut self, n: u32) -> Self {
        self.max_usage_count = n;
        self
    }

    pub fn with_max_error_score(mut self, n: f64) -> Self {
        self.max_error_score = n;
        self
    }

    pub fn with_blocked_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.blocked_status_codes = codes.into_iter().collect();
        self
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.cookie_jar.clone()
    }

    /// Scope cookies to the request URL's origin, per §4.2.
    pub fn set_cookies(&self, url: &Url, cookie_headers: &[String]) {
        for header in cookie_headers {
            self.cookie_jar.add_cookie_str(header, url);
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.retired
            && self.usage_count < self.max_usage_count
            && self.error_score < self.max_error_score
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Called once per handler invocation on success: pulls the error score
    /// back toward zero rather than resetting it outright, so a session
    /// that had one bad response doesn't instantly look pristine again.
    pub fn mark_good(&mut self) {
        self.usage_count += 1;
        self.error_score = (self.error_score - 0.5).max(0.0);
    }

    pub fn mark_bad(&mut self) {
        self.usage_count += 1;
        self.error_score += 1.0;
        if self.error_score >= self.max_error_score {
            self.retired = true;
        }
    }

    /// A response status in `blocked_status_codes` is an automatic bad mark
    /// and immediate retirement, regardless of error-score headroom.
    pub fn mark_blocked(&mut self, status: u16) -> bool {
        if self.blocked_status_codes.contains(&status) {
            self.retired = true;
            self.error_score = self.max_error_score;
            true
        } else {
            false
        }
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }
}
