//! Error types.
//!
//! Two kinds of failure live in this crate:
//!
//! - [`SignalError`] is returned to the caller when an operation is misused
//!   (an empty cache id, writing to a destroyed cell) or when the store cannot
//!   be built.
//! - [`ErrorInfo`] is plain data recorded on a cell when one of its
//!   resolutions fails. It is never returned from `set`; callers read it back
//!   through [`Signal::error`](crate::reactive::Signal::error).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced directly to callers of the store and its cells.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A cell was requested with an empty cache id.
    #[error("signal cache id must not be empty")]
    EmptyId,

    /// The cell was destroyed, explicitly or by a cleanup pass.
    #[error("signal `{id}` in scope `{scope}` has been destroyed")]
    Destroyed {
        /// Scope the cell belonged to.
        scope: String,
        /// Cache id of the cell.
        id: String,
    },

    /// No executor was supplied and no Tokio runtime is running.
    #[error("no async runtime available; build the store inside a Tokio runtime or supply an executor")]
    NoRuntime,

    /// The store configuration is unusable.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// A value could not be converted to or from JSON.
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The error state recorded on a cell after a failed resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human readable failure message.
    pub message: String,

    /// Optional status code, e.g. the HTTP status of a failed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ErrorInfo {
    /// Create an error with a message and no code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a status code.
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Build an error from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "resolution panicked".to_string()
        };
        Self::new(message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl From<&str> for ErrorInfo {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ErrorInfo {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
