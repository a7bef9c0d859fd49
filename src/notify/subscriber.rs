//! Subscriber-based notifications for configuration and record changes.

use parking_lot::RwLock;
use std::sync::Arc;

type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Handle for a subscription that can be dropped to unsubscribe.
///
/// When the handle is dropped, the subscription is removed immediately.
pub struct SubscriptionHandle<E> {
    id: usize,
    registry: Arc<RwLock<SubscriberRegistryInner<E>>>,
}

impl<E> Drop for SubscriptionHandle<E> {
    fn drop(&mut self) {
        let id = self.id;
        self.registry
            .write()
            .subscribers
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

impl<E> std::fmt::Debug for SubscriptionHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish()
    }
}

struct SubscriberRegistryInner<E> {
    subscribers: Vec<(usize, Arc<Callback<E>>)>,
    next_id: usize,
}

/// Registry for callbacks interested in events of type `E`.
///
/// Callbacks are invoked outside the registry lock, so a callback may
/// subscribe or drop handles without deadlocking.
///
/// # Examples
///
/// ```rust
/// use app_monitor::notify::SubscriberRegistry;
///
/// let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
/// let handle = registry.subscribe(|event: &String| println!("changed: {event}"));
///
/// registry.notify_all(&"dropins".to_string());
/// drop(handle);
/// ```
pub struct SubscriberRegistry<E> {
    inner: Arc<RwLock<SubscriberRegistryInner<E>>>,
}

impl<E> SubscriberRegistry<E> {
    /// Create a new subscriber registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SubscriberRegistryInner {
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register `callback`; it runs for every event until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(Box::new(callback))));

        SubscriptionHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Notify all subscribers in subscription order.
    pub fn notify_all(&self, event: &E) {
        let callbacks: Vec<_> = self
            .inner
            .read()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

impl<E> Default for SubscriberRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for SubscriberRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for SubscriberRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_notify() {
        let registry = SubscriberRegistry::new();
        let total = Arc::new(AtomicUsize::new(0));

        let total_clone = Arc::clone(&total);
        let _handle = registry.subscribe(move |n: &usize| {
            total_clone.fetch_add(*n, Ordering::SeqCst);
        });

        registry.notify_all(&2);
        registry.notify_all(&3);
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let registry = SubscriberRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let handle = registry.subscribe(move |_: &()| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        registry.notify_all(&());
        assert_eq!(registry.subscriber_count(), 1);

        drop(handle);
        registry.notify_all(&());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_subscribe() {
        let registry: SubscriberRegistry<()> = SubscriberRegistry::new();
        let nested = registry.clone();
        let handles = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let handles_clone = Arc::clone(&handles);
        let _handle = registry.subscribe(move |_| {
            handles_clone.lock().push(nested.subscribe(|_| {}));
        });

        registry.notify_all(&());
        assert_eq!(registry.subscriber_count(), 2);
    }
}
