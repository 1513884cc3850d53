//! Task Execution
//!
//! The store never awaits anything on the caller's stack. Pending
//! resolutions and cleanup passes are handed to an [`Executor`], which is
//! the only place the crate touches the async runtime.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;

use crate::error::SignalError;

/// Spawns detached background tasks.
pub trait Executor: Send + Sync + 'static {
    /// Run a task soon.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// Whether [`spawn_idle`](Self::spawn_idle) defers work to idle time.
    fn supports_idle(&self) -> bool {
        false
    }

    /// Run a task once the host is idle, or after `timeout` at the latest.
    ///
    /// The default runs it like [`spawn`](Self::spawn).
    fn spawn_idle(&self, task: BoxFuture<'static, ()>, timeout: Duration) {
        let _ = timeout;
        self.spawn(task);
    }
}

/// Executor backed by a Tokio runtime handle.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, SignalError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SignalError::NoRuntime)
    }
}

impl Executor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        // Detached; completion is observed through the store, not the handle.
        drop(self.handle.spawn(task));
    }
}
