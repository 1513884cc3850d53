//! Subscriber types for the reactive system.
//!
//! A Subscriber is a callback registered on a signal. It is invoked with the
//! signal's new value on every change, or with `None` when a resolution
//! fails.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::signal::SignalInner;

/// Callback invoked with a signal's value.
pub type Callback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Unique identifier for a subscriber.
///
/// Each subscription gets its own ID, so the same closure subscribed twice
/// is delivered to twice and unsubscribed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered callback.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    callback: Callback,
}

impl Subscriber {
    /// Create a new subscriber with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            callback: Arc::new(callback),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Deliver a value.
    ///
    /// A panicking callback is caught and logged. Returns `false` when the
    /// callback panicked.
    pub fn notify(&self, value: Option<&Value>) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(value))) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(subscriber = ?self.id, "signal subscriber panicked");
                false
            }
        }
    }
}

/// Handle returned by [`Signal::subscribe`](super::Signal::subscribe).
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). The handle does not keep the signal
/// alive.
#[must_use = "dropping a Subscription leaves the callback registered"]
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriberId,
    signal: Weak<SignalInner>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, signal: Weak<SignalInner>) -> Self {
        Self { id, signal }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback from the signal. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.remove_subscriber(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move |value| {
            assert_eq!(value, Some(&json!(1)));
            called_clone.store(true, Ordering::SeqCst);
        });

        assert!(!called.load(Ordering::SeqCst));
        assert!(subscriber.notify(Some(&json!(1))));
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_subscriber_is_contained() {
        let subscriber = Subscriber::new(|_| panic!("Callback error"));
        assert!(!subscriber.notify(None));
    }

    #[test]
    fn dangling_subscription_unsubscribe_is_a_no_op() {
        let subscription = Subscription::new(SubscriberId::new(), Weak::new());
        subscription.unsubscribe();
        subscription.unsubscribe();
    }
}
