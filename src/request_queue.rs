//! Dynamic, dedup'd source of crawl work backed by a [`RequestStorageClient`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::request::Request;
use crate::storage::{InMemoryRequestStorage, RequestStorageClient};

/// Outcome of [`RequestQueue::add_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddRequestInfo {
    pub was_already_present: bool,
    pub was_already_handled: bool,
}

/// Persistent request source with a local dedup cache in front of a
/// [`RequestStorageClient`].
///
/// The local `known_keys` cache exists purely to elide round-trips for
/// `add_request` dedup checks; it is never the source of truth for what is
/// actually claimable — `fetch_next_request` always asks the backing store,
/// per the stale-cache policy in the design notes.
pub struct RequestQueue {
    store: Arc<dyn RequestStorageClient>,
    known_keys: RwLock<HashSet<String>>,
    in_flight_adds: std::sync::atomic::AtomicU64,
}

impl RequestQueue {
    pub fn new(store: Arc<dyn RequestStorageClient>) -> Self {
        RequestQueue {
            store,
            known_keys: RwLock::new(HashSet::new()),
            in_flight_adds: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Convenience constructor backed by the in-memory store.
    pub fn new_in_memory() -> Self {
        Self::new(Arc::new(InMemoryRequestStorage::new()))
    }

    pub async fn add_request(&self, req: Request, forefront: bool) -> Result<AddRequestInfo> {
        self.in_flight_adds
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let key = req.unique_key.clone();
        {
            let known = self.known_keys.read().await;
            if known.contains(&key) {
                self.in_flight_adds
                    .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                // Cache says we've seen it; still ask the store for the
                // authoritative handled/present verdict rather than guessing.
                let existing = self.store.get(&key).await?;
                return Ok(AddRequestInfo {
                    was_already_present: true,
                    was_already_handled: existing.is_none(),
                });
            }
        }
        let result = self.store.add(req, forefront).await;
        self.in_flight_adds
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        let result = result?;
        self.known_keys.write().await.insert(key);
        Ok(AddRequestInfo {
            was_already_present: result.was_already_present,
            was_already_handled: result.was_already_handled,
        })
    }

    /// Atomically claims one pending request. Returning `None` does not mean
    /// the queue is empty — the local cache may simply believe nothing is
    /// ready yet; callers must tolerate this and retry on the scheduler's
    /// own cadence.
    pub async fn fetch_next_request(&self) -> Option<Request> {
        match self.store.list_and_lock_head().await {
            Ok(req) => req,
            Err(err) => {
                warn!(error = %err, "fetch_next_request: backing store error, treating as empty for now");
                None
            }
        }
    }

    /// Terminal. Idempotent for a given `unique_key`.
    pub async fn mark_request_handled(&self, req: &Request) -> Result<()> {
        debug!(unique_key = %req.unique_key, "marking request handled");
        self.store.mark_handled(&req.unique_key).await
    }

    /// Returns the request to pending, preserving its error history and
    /// bumping `retry_count` (already done by the caller via
    /// [`Request::record_error`] before calling this).
    pub async fn reclaim_request(&self, req: Request, forefront: bool) -> Result<()> {
        debug!(unique_key = %req.unique_key, retry_count = req.retry_count, "reclaiming request");
        self.store.reclaim(req, forefront).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.store.is_empty().await
    }

    /// Additionally requires nothing in-progress and no enqueue in flight.
    pub async fn is_finished(&self) -> Result<bool> {
        if self.in_flight_adds.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            return Ok(false);
        }
        if self.store.has_pending_locks().await? {
            return Ok(false);
        }
        self.store.is_empty().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dedup_by_unique_key() {
        let queue = RequestQueue::new_in_memory();
        let info1 = queue
            .add_request(Request::new("https://example.com/a"), false)
            .await
            .unwrap();
        assert!(!info1.was_already_present);

        let info2 = queue
            .add_request(Request::new("https://example.com/a"), false)
            .await
            .unwrap();
        assert!(info2.was_already_present);
    }

    #[tokio::test]
    async fn test_fetch_mark_handled_is_finished() {
        let queue = RequestQueue::new_in_memory();
        queue
            .add_request(Request::new("https://example.com/a"), false)
            .await
            .unwrap();

        assert!(!queue.is_finished().await.unwrap());
        let req = queue.fetch_next_request().await.unwrap();
        assert!(!queue.is_finished().await.unwrap()); // in-progress

        queue.mark_request_handled(&req).await.unwrap();
        assert!(queue.is_finished().await.unwrap());
    }

    #[tokio::test]
    async fn test_reclaim_increments_retry_and_returns_to_pending() {
        let queue = RequestQueue::new_in_memory();
        queue
            .add_request(Request::new("https://example.com/a"), false)
            .await
            .unwrap();
        let mut req = queue.fetch_next_request().await.unwrap();
        req.record_error("timeout");
        queue.reclaim_request(req, false).await.unwrap();

        let refetched = queue.fetch_next_request().await.unwrap();
        assert_eq!(refetched.retry_count, 1);
        assert!(!queue.is_finished().await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_next_none_when_only_in_progress() {
        let queue = RequestQueue::new_in_memory();
        queue
            .add_request(Request::new("https://example.com/a"), false)
            .await
            .unwrap();
        let _locked = queue.fetch_next_request().await.unwrap();
        assert!(queue.fetch_next_request().await.is_none());
    }
}
