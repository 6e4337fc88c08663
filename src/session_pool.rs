//! Bounded pool of [`Session`]s with lazy creation and random draw.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::IteratorRandom;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{CrawlerError, Result};
use crate::events::{Event, EventBus};
use crate::session::Session;

/// Tunables for [`SessionPool`], aggregated into [`crate::config::Configuration`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionPoolOptions {
    pub max_pool_size: usize,
    pub session_max_usage_count: u32,
    pub session_max_error_score: f64,
    pub persist_state_key: Option<String>,
}

impl Default for SessionPoolOptions {
    fn default() -> Self {
        SessionPoolOptions {
            max_pool_size: 1000,
            session_max_usage_count: 50,
            session_max_error_score: 3.0,
            persist_state_key: None,
        }
    }
}

/// Bounded set of reusable [`Session`]s. Mirrors the donor's
/// `Arc<RwLock<Vec<...>>>` sharing pattern in `ProxyPool`, generalized from
/// round-robin to scored random draw plus retirement.
pub struct SessionPool {
    options: SessionPoolOptions,
    sessions: RwLock<HashMap<String, Session>>,
    events: Arc<EventBus>,
    default_user_agent: String,
}

impl SessionPool {
    pub fn new(options: SessionPoolOptions, events: Arc<EventBus>) -> Self {
        SessionPool {
            options,
            sessions: RwLock::new(HashMap::new()),
            events,
            default_user_agent: "autoscrape/0.1".to_string(),
        }
    }

    pub fn with_default_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.default_user_agent = ua.into();
        self
    }

    /// Returns a usable session. If `session_id` is given, returns that
    /// exact session or errors if it's missing or retired; otherwise draws a
    /// random usable one, creating a fresh one if the pool has headroom.
    pub async fn get_session(&self, session_id: Option<&str>) -> Result<String> {
        if let Some(id) = session_id {
            let sessions = self.sessions.read().await;
            return match sessions.get(id) {
                Some(s) if s.is_usable() => Ok(id.to_string()),
                Some(_) => Err(CrawlerError::SessionNotFound(format!(
                    "{id} is retired"
                ))),
                None => Err(CrawlerError::SessionNotFound(id.to_string())),
            };
        }

        {
            let sessions = self.sessions.read().await;
            let usable_ids: Vec<&String> = sessions
                .iter()
                .filter(|(_, s)| s.is_usable())
                .map(|(id, _)| id)
                .collect();
            if let Some(id) = usable_ids.into_iter().choose(&mut rand::thread_rng()) {
                return Ok(id.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.options.max_pool_size {
            self.retire_worst(&mut sessions).await;
        }
        let session = Session::new(self.default_user_agent.clone())
            .with_max_usage_count(self.options.session_max_usage_count)
            .with_max_error_score(self.options.session_max_error_score);
        let id = session.id.clone();
        sessions.insert(id.clone(), session);
        Ok(id)
    }

    /// Evicts the session with the highest error score to make room for a
    /// new one. Removes it from the map outright rather than just flagging
    /// it retired — `max_pool_size` bounds the map itself, and a pool that
    /// only ever marks entries retired without dropping them would grow
    /// without bound under sustained pressure (e.g. a long crawl against a
    /// site that blocks every session it's handed).
    async fn retire_worst(&self, sessions: &mut HashMap<String, Session>) {
        if let Some(worst_id) = sessions
            .iter()
            .max_by(|a, b| a.1.error_score.total_cmp(&b.1.error_score))
            .map(|(id, _)| id.clone())
        {
            sessions.remove(&worst_id);
            info!(session_id = %worst_id, "session_pool: retired to make room");
            self.events.emit(Event::SessionRetired { session_id: worst_id });
        }
    }

    pub async fn mark_good(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))?;
        session.mark_good();
        Ok(())
    }

    pub async fn mark_bad(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))?;
        session.mark_bad();
        if session.is_retired() {
            info!(session_id, "session_pool: session retired after repeated errors");
            self.events.emit(Event::SessionRetired {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }

    /// Automatic bad mark and retirement for a blocked-status response.
    pub async fn mark_blocked(&self, session_id: &str, status: u16) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))?;
        let blocked = session.mark_blocked(status);
        if blocked {
            info!(session_id, status, "session_pool: session retired, blocked by target");
            self.events.emit(Event::SessionRetired {
                session_id: session_id.to_string(),
            });
        }
        Ok(blocked)
    }

    pub async fn retire(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))?;
        session.retire();
        self.events.emit(Event::SessionRetired {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    pub async fn cookie_jar(&self, session_id: &str) -> Result<Arc<reqwest::cookie::Jar>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))?;
        Ok(session.cookie_jar())
    }

    pub async fn is_retired(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.is_retired())
            .unwrap_or(true)
    }

    /// Snapshot session scoring state for persistence. The concrete sink
    /// (file/cloud key-value store) is out of scope (§1); this returns the
    /// data a caller would persist under `persist_state_key`.
    pub async fn persist_state(&self) -> Vec<(String, u32, f64)> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| (s.id.clone(), s.usage_count, s.error_score))
            .collect()
    }

    pub fn persist_state_key(&self) -> Option<&str> {
        self.options.persist_state_key.as_deref()
    }

    /// A detached copy of a session's current scoring/identity state, for
    /// callers (e.g. the crawling context) that want to read it without
    /// holding the pool's lock across an awaited call.
    pub async fn snapshot(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CrawlerError::SessionNotFound(session_id.to_string()))
    }
}
