//! Backing store abstraction for [`crate::request_queue::RequestQueue`].
//!
//! The concrete on-disk/cloud encoding is out of scope for this crate (it is
//! a separate storage driver); what lives here is the trait seam plus an
//! in-memory implementation that is enough to host the queue's cache,
//! ordering, and retry logic, and to drive this crate's own tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{CrawlerError, Result};
use crate::request::{Request, RequestState};

/// What `add` found when inserting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddRequestResult {
    pub was_already_present: bool,
    pub was_already_handled: bool,
}

/// Storage backend contract consumed by [`crate::request_queue::RequestQueue`].
///
/// Implementors own durability; the queue owns caching and retry semantics
/// on top. All operations are async so a real backend can do network I/O.
#[async_trait]
pub trait RequestStorageClient: Send + Sync {
    async fn add(&self, req: Request, forefront: bool) -> Result<AddRequestResult>;

    async fn get(&self, unique_key: &str) -> Result<Option<Request>>;

    /// Atomically claim one pending request, moving it to in-progress.
    async fn list_and_lock_head(&self) -> Result<Option<Request>>;

    async fn mark_handled(&self, unique_key: &str) -> Result<()>;

    /// Return a request to pending, preserving its accumulated error
    /// history. `forefront` re-inserts at the head of the pending order.
    async fn reclaim(&self, req: Request, forefront: bool) -> Result<()>;

    async fn is_empty(&self) -> Result<bool>;

    /// Whether anything is currently locked (in-progress).
    async fn has_pending_locks(&self) -> Result<bool>;
}

#[derive(Debug, Clone)]
enum Slot {
    Pending(Request),
    InProgress(Request),
    Handled,
}

/// In-memory [`RequestStorageClient`]. Not durable across process restarts
/// by itself — §4.1's "recoverable as pending on restart" invariant is
/// satisfied trivially here because there is nothing to recover from; a real
/// backend would persist `Slot::InProgress` entries so they rehydrate as
/// pending on the next `list_and_lock_head` after a crash.
pub struct InMemoryRequestStorage {
    inner: Mutex<Inner>,
}

struct Inner {
    slots: HashMap<String, Slot>,
    pending_order: VecDeque<String>,
}

impl InMemoryRequestStorage {
    pub fn new() -> Self {
        InMemoryRequestStorage {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                pending_order: VecDeque::new(),
            }),
        }
    }
}

impl Default for InMemoryRequestStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestStorageClient for InMemoryRequestStorage {
    async fn add(&self, mut req: Request, forefront: bool) -> Result<AddRequestResult> {
        let mut inner = self.inner.lock().await;
        let key = req.unique_key.clone();
        if let Some(existing) = inner.slots.get(&key) {
            let was_already_handled = matches!(existing, Slot::Handled);
            return Ok(AddRequestResult {
                was_already_present: true,
                was_already_handled,
            });
        }
        req.state = RequestState::Unprocessed;
        inner.slots.insert(key.clone(), Slot::Pending(req));
        if forefront {
            inner.pending_order.push_front(key);
        } else {
            inner.pending_order.push_back(key);
        }
        Ok(AddRequestResult {
            was_already_present: false,
            was_already_handled: false,
        })
    }

    async fn get(&self, unique_key: &str) -> Result<Option<Request>> {
        let inner = self.inner.lock().await;
        Ok(match inner.slots.get(unique_key) {
            Some(Slot::Pending(r)) | Some(Slot::InProgress(r)) => Some(r.clone()),
            _ => None,
        })
    }

    async fn list_and_lock_head(&self) -> Result<Option<Request>> {
        let mut inner = self.inner.lock().await;
        while let Some(key) = inner.pending_order.pop_front() {
            match inner.slots.get(&key) {
                Some(Slot::Pending(_)) => {
                    if let Some(Slot::Pending(mut req)) = inner.slots.remove(&key) {
                        req.state = RequestState::BeforeNav;
                        inner.slots.insert(key, Slot::InProgress(req.clone()));
                        return Ok(Some(req));
                    }
                }
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn mark_handled(&self, unique_key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.slots.get(unique_key) {
            Some(Slot::InProgress(_)) | Some(Slot::Pending(_)) => {
                inner.slots.insert(unique_key.to_string(), Slot::Handled);
                Ok(())
            }
            Some(Slot::Handled) => Ok(()),
            None => Err(CrawlerError::Storage(format!(
                "mark_handled: unknown key '{unique_key}'"
            ))),
        }
    }

    async fn reclaim(&self, req: Request, forefront: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = req.unique_key.clone();
        inner.slots.insert(key.clone(), Slot::Pending(req));
        if forefront {
            inner.pending_order.push_front(key);
        } else {
            inner.pending_order.push_back(key);
        }
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner
            .slots
            .values()
            .all(|s| matches!(s, Slot::Handled)))
    }

    async fn has_pending_locks(&self) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.slots.values().any(|s| matches!(s, Slot::InProgress(_))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_lock_head_round_trip() {
        let store = InMemoryRequestStorage::new();
        let req = Request::new("https://example.com/a");
        let res = store.add(req, false).await.unwrap();
        assert!(!res.was_already_present);

        let locked = store.list_and_lock_head().await.unwrap().unwrap();
        assert_eq!(locked.unique_key, "https://example.com/a");
        assert!(store.has_pending_locks().await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_add_is_detected() {
        let store = InMemoryRequestStorage::new();
        store.add(Request::new("https://example.com/a"), false).await.unwrap();
        let res = store.add(Request::new("https://example.com/a"), false).await.unwrap();
        assert!(res.was_already_present);
        assert!(!res.was_already_handled);
    }

    #[tokio::test]
    async fn test_mark_handled_then_is_empty() {
        let store = InMemoryRequestStorage::new();
        store.add(Request::new("https://example.com/a"), false).await.unwrap();
        let req = store.list_and_lock_head().await.unwrap().unwrap();
        store.mark_handled(&req.unique_key).await.unwrap();
        assert!(store.is_empty().await.unwrap());
        assert!(!store.has_pending_locks().await.unwrap());
    }

    #[tokio::test]
    async fn test_reclaim_returns_to_pending() {
        let store = InMemoryRequestStorage::new();
        store.add(Request::new("https://example.com/a"), false).await.unwrap();
        let mut req = store.list_and_lock_head().await.unwrap().unwrap();
        req.record_error("boom");
        store.reclaim(req, true).await.unwrap();

        let again = store.list_and_lock_head().await.unwrap().unwrap();
        assert_eq!(again.retry_count, 1);
        assert_eq!(again.error_messages, vec!["boom"]);
    }

    #[tokio::test]
    async fn test_forefront_ordering() {
        let store = InMemoryRequestStorage::new();
        store.add(Request::new("https://example.com/a"), false).await.unwrap();
        store.add(Request::new("https://example.com/b"), true).await.unwrap();
        let first = store.list_and_lock_head().await.unwrap().unwrap();
        assert_eq!(first.unique_key, "https://example.com/b");
    }
}
