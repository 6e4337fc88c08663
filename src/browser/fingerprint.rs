//! Generated browser fingerprints, cached per session/proxy identity.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A bundle of browser-identity properties meant to resemble a real user
/// agent, stamped onto launch options and injected into each page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub platform: String,
    pub languages: Vec<String>,
}

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1366, 768), (1536, 864)];

fn deterministic_index(key: &str, modulus: usize) -> usize {
    let mut hash: u64 = 1469598103934665603;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash as usize) % modulus
}

fn generate(key: &str) -> Fingerprint {
    let ua_idx = deterministic_index(key, USER_AGENTS.len());
    let vp_idx = deterministic_index(&format!("{key}:vp"), VIEWPORTS.len());
    let (width, height) = VIEWPORTS[vp_idx];
    Fingerprint {
        user_agent: USER_AGENTS[ua_idx].to_string(),
        viewport_width: width,
        viewport_height: height,
        platform: "Win32".to_string(),
        languages: vec!["en-US".to_string(), "en".to_string()],
    }
}

/// LRU cache of generated fingerprints keyed by `session_id` (falling back
/// to the proxy URL when there's no session), per §4.6. Deterministic given
/// the same key so a session retains the same fingerprint across retries
/// within the cache's retention.
pub struct FingerprintCache {
    cache: Mutex<LruCache<String, Fingerprint>>,
}

impl FingerprintCache {
    pub fn new(capacity: usize) -> Self {
        FingerprintCache {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Get or generate a fingerprint for `key` (`session_id ?? proxy_url`, §4.6).
    pub fn get_or_generate(&self, key: &str) -> Fingerprint {
        let mut cache = self.cache.lock().unwrap();
        if let Some(fp) = cache.get(key) {
            return fp.clone();
        }
        let fp = generate(key);
        cache.put(key.to_string(), fp.clone());
        fp
    }
}
