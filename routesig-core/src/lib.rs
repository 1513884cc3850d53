//! Routesig Core
//!
//! This crate provides a keyed, route-scoped reactive value store. It
//! implements:
//!
//! - Signals: named cells holding a JSON value, with subscribers
//! - A resolution pipeline accepting values, futures and producers, and
//!   unwrapping response-like envelopes
//! - Deep-equality change suppression
//! - Scope-based cleanup of cells left behind by navigation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Signals, subscribers, resolution and equality
//! - `store`: The scope → id → signal map, scope resolution and cleanup
//! - `executor`: The seam to the async runtime
//! - `config` and `error`: Store tuning and error types
//!
//! # Example
//!
//! ```rust,ignore
//! use routesig_core::{Input, SignalOptions, SignalStore};
//! use serde_json::json;
//!
//! let store = SignalStore::new()?;
//!
//! // Create a signal in the current scope
//! let user = store.signal("user", SignalOptions::new().initial(json!(null)))?;
//!
//! // Observe it
//! let subscription = user.subscribe(|value| println!("user: {value:?}"))?;
//!
//! // Resolve it from a request; `{ "data": ... }` envelopes are unwrapped
//! user.set(Input::deferred(async { Ok::<_, String>(json!({ "data": { "id": 7 } })) }))?;
//!
//! // Navigating elsewhere lets the old scope's signals be reclaimed
//! store.cleanup_old_scopes("/settings");
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod reactive;
pub mod store;

pub use config::StoreConfig;
pub use error::{ErrorInfo, SignalError};
pub use executor::{Executor, TokioExecutor};
pub use reactive::{is_equal, Envelope, Input, Resolved, Signal, Subscription};
pub use store::{Location, LocationScope, ScopeResolver, SignalOptions, SignalStore, StoreBuilder};
