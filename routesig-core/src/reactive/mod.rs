//! Reactive Primitives
//!
//! This module implements the cell side of the store: signals, their
//! subscribers, the pipeline that resolves what is passed to `set`, and the
//! structural comparison that decides whether a resolution changed anything.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a named container for a JSON value. Its value changes only
//! through `set`, and every change is pushed to its subscribers in the order
//! they subscribed.
//!
//! ## Inputs and Resolutions
//!
//! `set` accepts an [`Input`]: a value available now, a future, or a closure
//! producing a future. Each call starts a [`Resolution`] which awaits the
//! input, unwraps response-like envelopes, and yields the value to publish.
//!
//! ## Change Suppression
//!
//! A resolved value equal to the current one (see [`is_equal`]) is dropped,
//! so subscribers only hear about real changes.

mod equality;
mod resolve;
mod signal;
mod subscriber;

pub use equality::{is_equal, is_equal_opt};
pub use resolve::{Decoding, Deferred, Envelope, Input, Resolution, ResolutionState, Resolved};
pub use signal::Signal;
pub use subscriber::{Callback, Subscriber, SubscriberId, Subscription};
