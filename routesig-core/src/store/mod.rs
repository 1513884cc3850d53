//! Signal Store
//!
//! The store maps scope → cache id → signal. It is the only way to obtain a
//! [`Signal`], which guarantees that at most one cell exists per
//! `(scope, id)` pair: asking again returns a handle to the same cell.
//!
//! # Overview
//!
//! ```text
//!   SignalStore
//!     ├── "/users?page=1"  ── "users" ──► Signal
//!     │                    └─ "filter" ─► Signal
//!     └── "/settings"      ── "theme"  ──► Signal (global)
//! ```
//!
//! Creating a cell marks its scope active with the [`CleanupScheduler`].
//! The next cleanup pass keeps every scope marked since the previous pass
//! and reclaims the non-global cells of all others.
//!
//! # Design Decisions
//!
//! 1. Both map levels are `IndexMap`s, so lookups by id scan scopes in
//!    creation order and the first match is deterministic. The number of
//!    scopes is bounded by recent navigation, not by data volume.
//!
//! 2. A scope whose last cell is removed is removed too.
//!
//! 3. The store is an explicit object handed to whoever needs it. Cloning
//!    it is cheap and shares the same cells.

mod cleanup;
mod scope;

pub use cleanup::CleanupScheduler;
pub use scope::{FixedScope, Location, LocationScope, NoLocation, ScopeResolver};

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::error::SignalError;
use crate::executor::{Executor, TokioExecutor};
use crate::reactive::{Input, Signal};

/// Options for [`SignalStore::signal`].
#[derive(Debug, Default)]
pub struct SignalOptions {
    scope: Option<String>,
    initial: Option<Input>,
    global: bool,
}

impl SignalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the cell in this scope instead of the resolver's current one.
    /// An empty string counts as no override.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Value to `set` when the cell is created. Ignored if it already exists.
    pub fn initial(mut self, initial: impl Into<Input>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    /// Exempt the cell from scope cleanup.
    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }
}

#[derive(Debug, Clone)]
struct SignalEntry {
    global: bool,
    signal: Signal,
}

type ScopeMap = IndexMap<String, IndexMap<String, SignalEntry>>;

pub(crate) struct StoreInner {
    config: StoreConfig,
    scopes: Mutex<ScopeMap>,
    cleanup: CleanupScheduler,
    executor: Arc<dyn Executor>,
    resolver: Arc<dyn ScopeResolver>,
}

impl StoreInner {
    fn find_scope(&self, id: &str) -> Option<String> {
        self.scopes
            .lock()
            .iter()
            .find(|(_, entries)| entries.contains_key(id))
            .map(|(scope, _)| scope.clone())
    }

    /// Remove one cell. Returns whether it existed.
    fn destroy_in(&self, scope: &str, id: &str) -> bool {
        let removed = {
            let mut scopes = self.scopes.lock();
            let Some(entries) = scopes.get_mut(scope) else {
                return false;
            };
            let removed = entries.shift_remove(id);
            if entries.is_empty() {
                scopes.shift_remove(scope);
            }
            removed
        };

        match removed {
            Some(entry) => {
                entry.signal.destroy();
                tracing::debug!(scope, id, "signal destroyed");
                true
            }
            None => false,
        }
    }

    /// `(scope, id)` of every non-global cell outside `keep`.
    fn collect_stale(&self, keep: &IndexSet<String>) -> Vec<(String, String)> {
        self.scopes
            .lock()
            .iter()
            .filter(|(scope, _)| !keep.contains(*scope))
            .flat_map(|(scope, entries)| {
                entries
                    .iter()
                    .filter(|(_, entry)| !entry.global)
                    .map(move |(id, _)| (scope.clone(), id.clone()))
            })
            .collect()
    }
}

/// Builder for a [`SignalStore`].
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    executor: Option<Arc<dyn Executor>>,
    resolver: Option<Arc<dyn ScopeResolver>>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Executor for pending resolutions and cleanup passes.
    /// Defaults to the Tokio runtime `build` is called on.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Resolver for the current scope. Defaults to [`NoLocation`].
    pub fn scope_resolver(mut self, resolver: Arc<dyn ScopeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<SignalStore, SignalError> {
        self.config.validate()?;
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(TokioExecutor::current()?),
        };
        let resolver = self.resolver.unwrap_or_else(|| Arc::new(NoLocation));

        Ok(SignalStore {
            inner: Arc::new(StoreInner {
                config: self.config,
                scopes: Mutex::new(IndexMap::new()),
                cleanup: CleanupScheduler::new(),
                executor,
                resolver,
            }),
        })
    }
}

/// A keyed, scope-partitioned collection of signals.
#[derive(Clone)]
pub struct SignalStore {
    inner: Arc<StoreInner>,
}

impl SignalStore {
    /// A store with default configuration on the current Tokio runtime.
    pub fn new() -> Result<Self, SignalError> {
        StoreBuilder::new().build()
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.inner.cleanup
    }

    /// The scope used when a call names none.
    pub fn current_scope(&self) -> String {
        self.resolve_scope(None)
    }

    /// A non-empty `explicit` scope, else the resolver's, else the fallback.
    pub fn resolve_scope(&self, explicit: Option<&str>) -> String {
        scope::resolve_scope(
            explicit,
            self.inner.resolver.as_ref(),
            &self.inner.config.fallback_scope,
        )
    }

    /// Get or create the signal `id`.
    ///
    /// An existing signal is returned as-is; the options' initial value and
    /// global flag only apply on creation. A newly created signal marks its
    /// scope active and then resolves the initial value, if any.
    pub fn signal(&self, id: &str, options: SignalOptions) -> Result<Signal, SignalError> {
        if id.is_empty() {
            tracing::warn!("refusing to create a signal with an empty id");
            return Err(SignalError::EmptyId);
        }

        let scope = self.resolve_scope(options.scope.as_deref());
        let signal = {
            let mut scopes = self.inner.scopes.lock();
            let entries = scopes.entry(scope.clone()).or_default();
            if let Some(existing) = entries.get(id) {
                return Ok(existing.signal.clone());
            }

            let signal = Signal::new(
                id,
                scope.as_str(),
                options.global,
                Arc::clone(&self.inner.executor),
            );
            entries.insert(
                id.to_string(),
                SignalEntry {
                    global: options.global,
                    signal: signal.clone(),
                },
            );
            signal
        };

        tracing::debug!(scope = %scope, id, global = options.global, "signal created");
        self.inner.cleanup.mark_scope_active(&self.inner, &scope);

        if let Some(initial) = options.initial {
            signal.set(initial)?;
        }
        Ok(signal)
    }

    /// Look up a signal without creating it.
    pub fn get(&self, scope: &str, id: &str) -> Option<Signal> {
        self.inner
            .scopes
            .lock()
            .get(scope)
            .and_then(|entries| entries.get(id))
            .map(|entry| entry.signal.clone())
    }

    /// First scope, in creation order, holding a signal with this id.
    pub fn find_scope(&self, id: &str) -> Option<String> {
        self.inner.find_scope(id)
    }

    /// Destroy the signal `id` in the first scope holding it.
    /// Unknown ids are ignored.
    pub fn destroy(&self, id: &str) {
        if let Some(scope) = self.inner.find_scope(id) {
            self.inner.destroy_in(&scope, id);
        }
    }

    /// Drop every subscriber of `id` while keeping its value.
    pub fn clear_listeners(&self, id: &str) {
        let Some(scope) = self.inner.find_scope(id) else {
            return;
        };
        if let Some(signal) = self.get(&scope, id) {
            signal.clear_listeners();
        }
    }

    /// Mark `current` active and queue a cleanup pass for other scopes.
    /// An empty scope is ignored.
    pub fn cleanup_old_scopes(&self, current: &str) {
        self.inner.cleanup.mark_scope_active(&self.inner, current);
    }

    /// Run a cleanup pass now, keeping the scopes marked so far.
    /// Returns the number of signals destroyed.
    pub async fn run_cleanup(&self) -> usize {
        self.inner.cleanup.run_pass(&self.inner).await
    }

    /// Resolve once no cleanup pass is queued or running.
    pub async fn wait_for_cleanup(&self) {
        self.inner.cleanup.wait_idle().await;
    }

    pub fn contains_scope(&self, scope: &str) -> bool {
        self.inner.scopes.lock().contains_key(scope)
    }

    /// Scopes currently holding signals, in creation order.
    pub fn scopes(&self) -> Vec<String> {
        self.inner.scopes.lock().keys().cloned().collect()
    }

    pub fn scope_count(&self) -> usize {
        self.inner.scopes.lock().len()
    }

    /// Total number of signals across scopes.
    pub fn len(&self) -> usize {
        self.inner.scopes.lock().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.scopes.lock().is_empty()
    }

    /// Destroy every signal, global ones included, and drop pending cleanup.
    ///
    /// Handles held elsewhere become dead. The store itself stays usable.
    pub fn teardown(&self) {
        let scopes = std::mem::take(&mut *self.inner.scopes.lock());
        self.inner.cleanup.clear_pending();

        let mut destroyed = 0;
        for entry in scopes.into_values().flat_map(IndexMap::into_values) {
            entry.signal.destroy();
            destroyed += 1;
        }
        tracing::debug!(destroyed, "store torn down");
    }
}

impl std::fmt::Debug for SignalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalStore")
            .field("scopes", &self.scope_count())
            .field("signals", &self.len())
            .field("pending_cleanup", &self.inner.cleanup.pending_scopes())
            .finish()
    }
}
