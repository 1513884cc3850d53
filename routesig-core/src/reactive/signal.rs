//! Signal Implementation
//!
//! A Signal is a named cell in the store. It holds the latest resolved
//! value, the error of the latest failed resolution, and the callbacks to
//! notify when either changes.
//!
//! # How Signals Work
//!
//! 1. `set` starts a [`Resolution`] for its input. Inputs that need no
//!    awaiting are published before `set` returns; the rest are spawned on
//!    the store's executor and published when they complete.
//!
//! 2. Publishing a value compares it with the current one. Equal values are
//!    dropped without notifying anyone.
//!
//! 3. Publishing an error records it, keeps the previous value, and notifies
//!    subscribers with `None`.
//!
//! # Lifecycle
//!
//! A signal starts unsettled (`get` returns `None`) and becomes settled on
//! its first successful resolution. Destroying it clears its subscribers and
//! marks it dead: `set` and `subscribe` then fail with
//! [`SignalError::Destroyed`], and resolutions still in flight are discarded
//! when they complete.
//!
//! # Thread Safety
//!
//! The cell state and subscriber list sit behind separate mutexes. Neither
//! lock is held while callbacks run, so a callback may freely read or write
//! the signal that notified it.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;

use super::equality::is_equal_opt;
use super::resolve::{Input, Resolution};
use super::subscriber::{Subscriber, SubscriberId, Subscription};
use crate::error::{ErrorInfo, SignalError};
use crate::executor::Executor;

#[derive(Debug, Default)]
struct CellState {
    value: Option<Value>,
    error: Option<ErrorInfo>,
    settled: bool,
}

/// Shared state behind every clone of a [`Signal`].
pub(crate) struct SignalInner {
    cache_id: String,
    scope: String,
    global: bool,
    live: AtomicBool,
    state: Mutex<CellState>,
    subscribers: Mutex<IndexMap<SubscriberId, Subscriber>>,
    executor: Arc<dyn Executor>,
}

impl SignalInner {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn remove_subscriber(&self, id: SubscriberId) {
        self.subscribers.lock().shift_remove(&id);
    }

    fn publish(&self, outcome: Result<Value, ErrorInfo>) {
        let delivered = {
            let mut state = self.state.lock();
            // `destroy` clears the flag while holding this lock.
            if !self.is_live() {
                tracing::debug!(
                    scope = %self.scope,
                    id = %self.cache_id,
                    "discarding resolution for destroyed signal"
                );
                return;
            }

            match outcome {
                Ok(value) => {
                    let unchanged = state.error.is_none()
                        && is_equal_opt(state.value.as_ref(), Some(&value));
                    if unchanged {
                        tracing::trace!(id = %self.cache_id, "value unchanged, skipping notify");
                        return;
                    }
                    state.value = Some(value.clone());
                    state.error = None;
                    state.settled = true;
                    Some(value)
                }
                Err(error) => {
                    tracing::debug!(id = %self.cache_id, %error, "signal resolution failed");
                    state.error = Some(error);
                    None
                }
            }
        };

        self.notify(delivered.as_ref());
    }

    /// Notify subscribers in subscription order.
    fn notify(&self, value: Option<&Value>) {
        let subscribers: SmallVec<[Subscriber; 4]> =
            self.subscribers.lock().values().cloned().collect();

        tracing::trace!(
            id = %self.cache_id,
            subscribers = subscribers.len(),
            "notifying subscribers"
        );

        for subscriber in &subscribers {
            subscriber.notify(value);
        }
    }
}

/// A reactive cell holding a JSON value.
///
/// Cloning a `Signal` yields another handle to the same cell; use
/// [`Signal::ptr_eq`] to compare identity.
///
/// # Example
///
/// ```rust,ignore
/// let count = store.signal("count", SignalOptions::new().initial(json!(0)))?;
///
/// let subscription = count.subscribe(|value| println!("count: {value:?}"))?;
/// count.set(json!(5))?;                       // prints "count: Some(Number(5))"
/// count.set(Input::deferred(fetch_count()))?; // prints when the fetch completes
/// subscription.unsubscribe();
/// ```
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    pub(crate) fn new(
        cache_id: impl Into<String>,
        scope: impl Into<String>,
        global: bool,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                cache_id: cache_id.into(),
                scope: scope.into(),
                global,
                live: AtomicBool::new(true),
                state: Mutex::new(CellState::default()),
                subscribers: Mutex::new(IndexMap::new()),
                executor,
            }),
        }
    }

    pub fn cache_id(&self) -> &str {
        &self.inner.cache_id
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// Whether this signal survives scope cleanup.
    pub fn is_global(&self) -> bool {
        self.inner.global
    }

    /// Whether this signal has not been destroyed.
    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Whether a resolution has ever succeeded.
    pub fn is_settled(&self) -> bool {
        self.inner.state.lock().settled
    }

    /// Get the current value, `None` before the first successful resolution.
    pub fn get(&self) -> Option<Value> {
        self.inner.state.lock().value.clone()
    }

    /// Get the current value decoded into `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>, SignalError> {
        self.get()
            .map(serde_json::from_value)
            .transpose()
            .map_err(SignalError::from)
    }

    /// The error of the latest failed resolution, cleared by the next success.
    pub fn error(&self) -> Option<ErrorInfo> {
        self.inner.state.lock().error.clone()
    }

    /// Resolve `input` and publish the result.
    ///
    /// Values and envelopes that need no decoding are published before this
    /// returns. Futures and producers are spawned; their results are
    /// published on completion. Concurrent resolutions are not ordered
    /// against each other; whichever completes last wins.
    pub fn set(&self, input: impl Into<Input>) -> Result<(), SignalError> {
        self.ensure_live()?;

        let mut resolution = Resolution::start(input.into());
        if resolution.is_finished() {
            if let Some(outcome) = resolution.take_outcome() {
                self.inner.publish(outcome);
            }
            return Ok(());
        }

        tracing::trace!(
            scope = %self.inner.scope,
            id = %self.inner.cache_id,
            state = ?resolution.state(),
            "spawning pending resolution"
        );

        let inner = Arc::clone(&self.inner);
        self.inner.executor.spawn(
            async move {
                let outcome = resolution.await;
                inner.publish(outcome);
            }
            .boxed(),
        );
        Ok(())
    }

    /// Set a value computed from the current one.
    pub fn update<F>(&self, f: F) -> Result<(), SignalError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let next = f(self.get().as_ref());
        self.set(next)
    }

    /// Register a callback.
    ///
    /// If the signal is settled, the callback is invoked once immediately
    /// with the current value. Afterwards it receives every change, or
    /// `None` when a resolution fails.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, SignalError>
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.ensure_live()?;

        let subscriber = Subscriber::new(callback);
        let id = subscriber.id();
        self.inner.subscribers.lock().insert(id, subscriber.clone());

        let replay = {
            let state = self.inner.state.lock();
            if state.settled {
                state.value.clone()
            } else {
                None
            }
        };
        if let Some(value) = replay {
            subscriber.notify(Some(&value));
        }

        Ok(Subscription::new(id, Arc::downgrade(&self.inner)))
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn clear_listeners(&self) {
        self.inner.subscribers.lock().clear();
    }

    pub(crate) fn destroy(&self) {
        {
            let _state = self.inner.state.lock();
            self.inner.live.store(false, Ordering::SeqCst);
        }
        self.clear_listeners();
    }

    fn ensure_live(&self) -> Result<(), SignalError> {
        if self.is_live() {
            Ok(())
        } else {
            tracing::warn!(
                scope = %self.inner.scope,
                id = %self.inner.cache_id,
                "operation on destroyed signal"
            );
            Err(SignalError::Destroyed {
                scope: self.inner.scope.clone(),
                id: self.inner.cache_id.clone(),
            })
        }
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Signal")
            .field("scope", &self.inner.scope)
            .field("cache_id", &self.inner.cache_id)
            .field("global", &self.inner.global)
            .field("live", &self.is_live())
            .field("value", &state.value)
            .field("error", &state.error)
            .field("settled", &state.settled)
            .finish()
    }
}
