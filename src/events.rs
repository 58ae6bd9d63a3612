//! In-process event registry.
//!
//! The hosting application owns an [`EventRegistry`] and hands it to the
//! config loader, which emits [`SystemEvent::ConfigChanged`] after every
//! successful reload. Delivery is synchronous and best-effort: handlers run on
//! the emitting task, in subscription order, with no persistence or replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Events published by the configuration system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    /// A new configuration snapshot has been published.
    ConfigChanged,
}

impl SystemEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEvent::ConfigChanged => "config_changed",
        }
    }
}

impl std::fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked for a subscribed event.
pub type EventHandler = Arc<dyn Fn(&SystemEvent) + Send + Sync>;

/// Handle returned by [`EventRegistry::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    event: SystemEvent,
    handler: EventHandler,
}

/// Registry of event subscribers.
///
/// Thread-safe: uses an internal `Mutex` so it can be shared across async
/// tasks without requiring `&mut self`. Handlers are called outside the lock,
/// so a handler may subscribe or unsubscribe.
pub struct EventRegistry {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&self, event: SystemEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&SystemEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            event,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Number of handlers registered for `event`.
    pub fn subscriber_count(&self, event: SystemEvent) -> usize {
        self.lock().iter().filter(|s| s.event == event).count()
    }

    /// Deliver `event` to every subscriber. Returns how many were notified.
    pub fn emit(&self, event: SystemEvent) -> usize {
        let handlers: Vec<EventHandler> = self
            .lock()
            .iter()
            .filter(|s| s.event == event)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        trace!(event = %event, subscribers = handlers.len(), "Emitting event");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            registry.subscribe(SystemEvent::ConfigChanged, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.emit(SystemEvent::ConfigChanged), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = EventRegistry::new();
        let id = registry.subscribe(SystemEvent::ConfigChanged, |_| {});
        assert_eq!(registry.subscriber_count(SystemEvent::ConfigChanged), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert_eq!(registry.emit(SystemEvent::ConfigChanged), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_emit() {
        let registry = Arc::new(EventRegistry::new());
        let slot = Arc::new(Mutex::new(None));
        let id = {
            let registry_ref = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            registry.subscribe(SystemEvent::ConfigChanged, move |_| {
                if let Some(id) = slot.lock().unwrap().take() {
                    registry_ref.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        assert_eq!(registry.emit(SystemEvent::ConfigChanged), 1);
        assert_eq!(registry.subscriber_count(SystemEvent::ConfigChanged), 0);
    }

    #[test]
    fn test_event_name() {
        assert_eq!(SystemEvent::ConfigChanged.to_string(), "config_changed");
    }
}
