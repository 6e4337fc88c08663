//! Finite, ordered, restartable source of requests.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::Request;

/// A restartable snapshot of iteration progress: next index, the set of
/// indices currently checked out, and the set reclaimed back to pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestListState {
    pub next_index: usize,
    pub in_progress: HashSet<usize>,
    pub reclaimed: HashSet<usize>,
}

/// An append-only, ordered sequence of requests with restartable iteration.
///
/// Unlike [`crate::request_queue::RequestQueue`], a `RequestList` is finite
/// and fixed at construction time; it exists for the "I already have the
/// full URL list" case, as opposed to recursively discovered work.
pub struct RequestList {
    requests: Vec<Request>,
    persist_state_key: Option<String>,
    state: Mutex<RequestListState>,
}

impl RequestList {
    pub fn new(requests: Vec<Request>) -> Self {
        RequestList {
            requests,
            persist_state_key: None,
            state: Mutex::new(RequestListState::default()),
        }
    }

    pub fn with_persist_state_key(mut self, key: impl Into<String>) -> Self {
        self.persist_state_key = Some(key.into());
        self
    }

    pub fn persist_state_key(&self) -> Option<&str> {
        self.persist_state_key.as_deref()
    }

    /// Restore iteration progress from a previously persisted snapshot.
    /// Any indices recorded as `in_progress` in the snapshot are treated as
    /// `reclaimed` on resume, since the process that held them is gone.
    pub fn restore_state(&self, mut snapshot: RequestListState) {
        snapshot.reclaimed.extend(snapshot.in_progress.drain());
        *self.state.lock().unwrap() = snapshot;
    }

    pub fn export_state(&self) -> RequestListState {
        self.state.lock().unwrap().clone()
    }

    /// Fetch the next request: prefers reclaimed indices (in ascending
    /// order) over advancing `next_index`, so retried items are not starved
    /// by a long initial pass.
    pub fn fetch_next_request(&self) -> Option<Request> {
        let mut state = self.state.lock().unwrap();
        let idx = if let Some(&idx) = state.reclaimed.iter().min() {
            state.reclaimed.remove(&idx);
            idx
        } else if state.next_index < self.requests.len() {
            let idx = state.next_index;
            state.next_index += 1;
            idx
        } else {
            return None;
        };
        state.in_progress.insert(idx);
        self.requests.get(idx).cloned().map(|mut r| {
            debug!(unique_key = %r.unique_key, index = idx, "RequestList: dispatched");
            r.state = crate::request::RequestState::BeforeNav;
            r
        })
    }

    /// Index lookup by `unique_key`; O(n), fine for the list's finite scale.
    fn index_of(&self, unique_key: &str) -> Option<usize> {
        self.requests.iter().position(|r| r.unique_key == unique_key)
    }

    pub fn mark_request_handled(&self, req: &Request) {
        if let Some(idx) = self.index_of(&req.unique_key) {
            self.state.lock().unwrap().in_progress.remove(&idx);
        }
    }

    pub fn reclaim_request(&self, req: &Request) {
        if let Some(idx) = self.index_of(&req.unique_key) {
            let mut state = self.state.lock().unwrap();
            state.in_progress.remove(&idx);
            state.reclaimed.insert(idx);
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.next_index >= self.requests.len() && state.reclaimed.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.next_index >= self.requests.len()
            && state.reclaimed.is_empty()
            && state.in_progress.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_list_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
