//! Change notification
//!
//! Listeners are parameterless callbacks invoked after every committed local
//! mutation and after every sync cycle. Readers fetch fresh state themselves.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Registry of change listeners
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    registry: Arc<Mutex<Registry>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every listener registered when the pass starts, in
    /// registration order
    ///
    /// The registry lock is released while a listener runs, so listeners may
    /// subscribe, unsubscribe or trigger another notification. A listener
    /// removed during the pass is skipped if it has not run yet.
    pub fn notify(&self) {
        let ids: Vec<u64> = self.registry.lock().listeners.iter().map(|(id, _)| *id).collect();

        for id in ids {
            let listener = self
                .registry
                .lock()
                .listeners
                .iter()
                .find(|(existing, _)| *existing == id)
                .map(|(_, listener)| Arc::clone(listener));

            if let Some(listener) = listener {
                listener();
            }
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().listeners.is_empty()
    }
}

/// Handle returned by [`SubscriptionHub::subscribe`]
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener; calling this more than once is harmless
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .listeners
                .retain(|(existing, _)| *existing != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_calls_each_listener_once() {
        let hub = SubscriptionHub::new();
        let (a, listener_a) = counter();
        let (b, listener_b) = counter();
        hub.subscribe(listener_a);
        hub.subscribe(listener_b);

        hub.notify();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_order() {
        let hub = SubscriptionHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            hub.subscribe(move || order.lock().push(n));
        }

        hub.notify();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = SubscriptionHub::new();
        let (count, listener) = counter();
        let subscription = hub.subscribe(listener);

        subscription.unsubscribe();
        subscription.unsubscribe();
        hub.notify();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_dropping_handle_keeps_listener() {
        let hub = SubscriptionHub::new();
        let (count, listener) = counter();
        drop(hub.subscribe(listener));

        hub.notify();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_notification() {
        let hub = SubscriptionHub::new();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&victim);
        hub.subscribe(move || {
            if let Some(subscription) = slot.lock().take() {
                subscription.unsubscribe();
            }
        });

        let (count, listener) = counter();
        *victim.lock() = Some(hub.subscribe(listener));

        hub.notify();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_listener_may_self_unsubscribe() {
        let hub = SubscriptionHub::new();
        let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let slot = Arc::clone(&own);
        let seen = Arc::clone(&calls);
        let subscription = hub.subscribe(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = slot.lock().as_ref() {
                subscription.unsubscribe();
            }
        });
        *own.lock() = Some(subscription);

        hub.notify();
        hub.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_hub_dropped() {
        let hub = SubscriptionHub::new();
        let (_, listener) = counter();
        let subscription = hub.subscribe(listener);
        drop(hub);

        subscription.unsubscribe();
    }
}
