//! Cleanup Scheduler
//!
//! Long-lived sessions keep creating scopes as the user navigates. The
//! scheduler reclaims cells belonging to scopes that are no longer active,
//! without doing the work on the caller's stack.
//!
//! # Algorithm
//!
//! 1. Every scope marked active is added to a pending set, and a single pass
//!    is queued. Marking more scopes while a pass is queued only grows the
//!    set.
//! 2. A pass snapshots and clears the pending set. Those scopes are kept;
//!    every non-global cell in any other scope is collected.
//! 3. Collected cells are destroyed in fixed-size batches. Between batches
//!    the pass yields, or sleeps for the throttle delay when the pass is
//!    large, so a burst of navigation does not starve foreground work.
//!
//! Global cells are never collected; only an explicit destroy removes them.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use indexmap::IndexSet;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::StoreInner;

/// Debounced, chunked reclamation of stale scopes.
#[derive(Debug, Default)]
pub struct CleanupScheduler {
    /// Scopes marked active since the last pass began.
    pending: Mutex<IndexSet<String>>,

    /// A pass has been handed to the executor but has not started.
    queued: AtomicBool,

    /// Passes currently destroying cells. A mark made during a pass queues
    /// another one, so two can overlap.
    running: AtomicUsize,

    /// Signalled when the last running pass finishes.
    finished: Notify,

    passes: AtomicU64,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes that the next pass will keep.
    pub fn pending_scopes(&self) -> Vec<String> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Whether a pass is queued or running.
    pub fn is_busy(&self) -> bool {
        self.queued.load(Ordering::SeqCst) || self.running.load(Ordering::SeqCst) > 0
    }

    /// Number of passes completed so far.
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Add `scope` to the pending set and queue a pass if none is queued.
    pub(crate) fn mark_scope_active(&self, store: &Arc<StoreInner>, scope: &str) {
        if scope.is_empty() {
            return;
        }
        self.pending.lock().insert(scope.to_string());
        self.schedule(store);
    }

    fn schedule(&self, store: &Arc<StoreInner>) {
        if self.queued.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(store);
        let pass = async move {
            if let Some(store) = weak.upgrade() {
                store.cleanup.run_pass(&store).await;
            }
        };

        let config = &store.config;
        if store.executor.supports_idle() {
            store
                .executor
                .spawn_idle(pass.boxed(), config.idle_timeout());
        } else {
            let delay = if self.pending.lock().len() > config.throttle_threshold {
                config.throttle_delay()
            } else {
                Duration::ZERO
            };
            store.executor.spawn(
                async move {
                    pause(delay).await;
                    pass.await;
                }
                .boxed(),
            );
        }
    }

    /// Run one pass now. Returns the number of cells destroyed.
    pub(crate) async fn run_pass(&self, store: &StoreInner) -> usize {
        self.running.fetch_add(1, Ordering::SeqCst);
        let keep = std::mem::take(&mut *self.pending.lock());
        self.queued.store(false, Ordering::SeqCst);

        let destroyed = if keep.is_empty() {
            // No scope is known to be active; reclaiming everything would
            // include the scope the host is showing.
            tracing::debug!("cleanup pass skipped, no active scope");
            0
        } else {
            self.destroy_stale(store, &keep).await
        };

        self.passes.fetch_add(1, Ordering::SeqCst);
        if self.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finished.notify_waiters();
        }
        destroyed
    }

    async fn destroy_stale(&self, store: &StoreInner, keep: &IndexSet<String>) -> usize {
        let stale = store.collect_stale(keep);
        let total = stale.len();
        let chunk_size = store.config.cleanup_chunk_size.max(1);
        let delay = if total > store.config.burst_threshold() {
            store.config.throttle_delay()
        } else {
            Duration::ZERO
        };

        let mut destroyed = 0;
        let mut chunks = stale.chunks(chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            for (scope, id) in chunk {
                if store.destroy_in(scope, id) {
                    destroyed += 1;
                }
            }
            if chunks.peek().is_some() {
                pause(delay).await;
            }
        }

        tracing::info!(
            kept = keep.len(),
            collected = total,
            destroyed,
            "cleanup pass finished"
        );
        destroyed
    }

    /// Resolve once no pass is queued or running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let finished = self.finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            finished.await;
        }
    }

    /// Forget pending scopes. A queued pass will then find nothing to keep
    /// and skip.
    pub(crate) fn clear_pending(&self) {
        self.pending.lock().clear();
    }
}

/// Give the executor a chance to run other work.
async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}
