//! The immutable-after-launch record describing how a browser was started.

use std::collections::HashMap;

use crate::browser::fingerprint::Fingerprint;
use crate::error::{CrawlerError, Result};

const RESERVED_KEYS: &[&str] = &[
    "proxy_url",
    "session_id",
    "user_data_dir",
    "incognito_pages",
    "fingerprint",
];

/// Describes how one browser was launched. Fields besides `extra` are the
/// well-known ones named in §3; `extra` is launcher-specific overflow.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub proxy_url: Option<String>,
    pub session_id: Option<String>,
    pub user_data_dir: Option<String>,
    pub incognito_pages: bool,
    pub fingerprint: Option<Fingerprint>,
    extra: HashMap<String, String>,
}

impl LaunchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_incognito_pages(mut self, value: bool) -> Self {
        self.incognito_pages = value;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// The key used to look up/generate a fingerprint for this context:
    /// `session_id` if present, otherwise the proxy URL.
    pub fn fingerprint_key(&self) -> Option<&str> {
        self.session_id.as_deref().or(self.proxy_url.as_deref())
    }

    /// Add a launcher-specific option. Refuses the well-known field names so
    /// `extra` can never silently shadow a typed field.
    pub fn extend(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(CrawlerError::ReservedLaunchKey(key));
        }
        self.extra.insert(key, value.into());
        Ok(())
    }

    pub fn get_extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_rejects_reserved_key() {
        let mut ctx = LaunchContext::new();
        let err = ctx.extend("session_id", "x").unwrap_err();
        assert!(matches!(err, CrawlerError::ReservedLaunchKey(_)));
    }

    #[test]
    fn test_extend_accepts_custom_key() {
        let mut ctx = LaunchContext::new();
        ctx.extend("window_size", "1024x768").unwrap();
        assert_eq!(ctx.get_extra("window_size"), Some("1024x768"));
    }

    #[test]
    fn test_fingerprint_key_prefers_session_id() {
        let ctx = LaunchContext::new()
            .with_session_id("s1")
            .with_proxy_url("http://proxy:8080");
        assert_eq!(ctx.fingerprint_key(), Some("s1"));
    }

    #[test]
    fn test_fingerprint_key_falls_back_to_proxy() {
        let ctx = LaunchContext::new().with_proxy_url("http://proxy:8080");
        assert_eq!(ctx.fingerprint_key(), Some("http://proxy:8080"));
    }

    #[test]
    fn test_fingerprint_key_none_when_neither_set() {
        let ctx = LaunchContext::new();
        assert_eq!(ctx.fingerprint_key(), None);
    }
}
