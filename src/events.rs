//! A small synchronous event dispatcher shared across the crawling core.
//!
//! Cross-component events are intentionally few (§9): retirement of
//! sessions/browsers, page lifecycle, and the two process-wide signals
//! (`persist_state`, `migrating`). Listeners run synchronously, in
//! registration order — this is a dispatcher, not a broadcast channel, so
//! ordering is deterministic and a panicking listener is the caller's bug to
//! find immediately rather than one lost in a background task.

use std::sync::RwLock;

/// Events emitted by the crawling core's components.
#[derive(Debug, Clone)]
pub enum Event {
    SessionRetired { session_id: String },
    BrowserRetired { browser_id: String },
    PageCreated { page_id: String },
    PageClosed { page_id: String },
    PersistState,
    Migrating,
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Typed event bus. Registration is `on`, dispatch is `emit`; both are
/// ordinary synchronous calls since there are no suspension points in
/// listener dispatch itself (a listener that needs to await something
/// should spawn its own task).
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners.write().unwrap().push(Box::new(listener));
    }

    pub fn emit(&self, event: Event) {
        for listener in self.listeners.read().unwrap().iter() {
            listener(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_listener_receives_emitted_event() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.on(move |event| {
            if matches!(event, Event::Migrating) {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        bus.emit(Event::Migrating);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.on(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.on(move |_| o2.lock().unwrap().push(2));
        bus.emit(Event::PersistState);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_no_listeners_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(Event::PageCreated {
            page_id: "p1".into(),
        });
    }
}
