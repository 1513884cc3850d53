//! Resolution Pipeline
//!
//! Every `set` on a cell runs its input through this pipeline. An input can
//! be a value that is available now, a future, or a producer closure that
//! returns a future when called. The pipeline awaits the outer computation,
//! then unwraps one level of "response-like" envelope before handing the
//! final value to the cell.
//!
//! # Unwrapping
//!
//! The first matching rule wins:
//!
//! 1. An envelope with a JSON accessor: await the decoded JSON.
//! 2. An envelope exposing `data`, or a JSON object with a `"data"` key:
//!    use that value.
//! 3. An envelope with a text accessor: await the text, as a JSON string.
//! 4. An envelope exposing `body`, or a JSON object with a `"body"` key:
//!    use that value as-is.
//! 5. Anything else is used unchanged.
//!
//! This lets the same cell accept raw values, fetch-style responses and
//! client envelopes such as `{ "data": ..., "status": 200 }`.
//!
//! # State Machine
//!
//! A [`Resolution`] is a hand-written future moving through
//! `AwaitingOuter -> AwaitingUnwrap -> Settled`, with `Failed` reachable
//! from every step. Inputs that need no awaiting finish inside
//! [`Resolution::start`], which lets the cell publish them synchronously.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, TryFutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorInfo;

/// A boxed computation yielding something to unwrap.
pub type Deferred = BoxFuture<'static, Result<Resolved, ErrorInfo>>;

/// A boxed decoding step of an envelope.
pub type Decoding<T> = BoxFuture<'static, Result<T, ErrorInfo>>;

type ProducerFn = Box<dyn FnOnce() -> Result<Deferred, ErrorInfo> + Send>;

/// A response-like wrapper around the value a computation produced.
///
/// Implement only the accessors the wrapper actually has. Accessors are
/// consulted in the order `json`, `data`, `text`, `body`; the first one that
/// returns `Some` decides the cell's value. When none do, `into_value` is
/// used.
pub trait Envelope: Send + 'static {
    /// Asynchronously decode the payload as JSON.
    fn json(&mut self) -> Option<Decoding<Value>> {
        None
    }

    /// An already decoded payload field.
    fn data(&mut self) -> Option<Value> {
        None
    }

    /// Asynchronously decode the payload as text.
    fn text(&mut self) -> Option<Decoding<String>> {
        None
    }

    /// A raw body field, used without further decoding.
    fn body(&mut self) -> Option<Value> {
        None
    }

    /// The envelope itself as a value.
    fn into_value(self: Box<Self>) -> Value {
        Value::Null
    }
}

/// The outcome of the outer computation, before unwrapping.
pub enum Resolved {
    Value(Value),
    Envelope(Box<dyn Envelope>),
}

impl Resolved {
    pub fn envelope<E: Envelope>(envelope: E) -> Self {
        Self::Envelope(Box::new(envelope))
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Envelope(_) => f.write_str("Envelope(..)"),
        }
    }
}

/// What can be passed to [`Signal::set`](super::Signal::set).
pub enum Input {
    /// Available now.
    Immediate(Resolved),
    /// A computation to await.
    Deferred(Deferred),
    /// Called once, synchronously, to obtain the computation to await.
    Producer(ProducerFn),
    /// A computation that has already failed.
    Rejected(ErrorInfo),
}

impl Input {
    /// An immediate value from anything serializable.
    ///
    /// A serialization failure becomes a rejected input.
    pub fn value<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Immediate(Resolved::Value(value)),
            Err(err) => Self::Rejected(ErrorInfo::new(err.to_string())),
        }
    }

    /// An immediate envelope.
    pub fn envelope<E: Envelope>(envelope: E) -> Self {
        Self::Immediate(Resolved::envelope(envelope))
    }

    /// A future to await.
    pub fn deferred<F, T, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Resolved>,
        E: Into<ErrorInfo>,
    {
        Self::Deferred(boxed(future))
    }

    /// A closure returning the future to await.
    pub fn producer<P, F, T, E>(producer: P) -> Self
    where
        P: FnOnce() -> F + Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Resolved>,
        E: Into<ErrorInfo>,
    {
        Self::Producer(Box::new(move || -> Result<Deferred, ErrorInfo> {
            Ok(boxed::<F, T, E>(producer()))
        }))
    }

    /// A closure that may fail before producing its future.
    pub fn try_producer<P, F, T, E>(producer: P) -> Self
    where
        P: FnOnce() -> Result<F, E> + Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Resolved>,
        E: Into<ErrorInfo>,
    {
        Self::Producer(Box::new(move || -> Result<Deferred, ErrorInfo> {
            match producer() {
                Ok(future) => Ok(boxed::<F, T, E>(future)),
                Err(err) => Err(err.into()),
            }
        }))
    }

    pub fn rejected(error: impl Into<ErrorInfo>) -> Self {
        Self::Rejected(error.into())
    }
}

fn boxed<F, T, E>(future: F) -> Deferred
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Into<Resolved>,
    E: Into<ErrorInfo>,
{
    future
        .map(|result| -> Result<Resolved, ErrorInfo> {
            match result {
                Ok(value) => Ok(value.into()),
                Err(err) => Err(err.into()),
            }
        })
        .boxed()
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Immediate(Resolved::Value(value))
    }
}

impl From<Resolved> for Input {
    fn from(resolved: Resolved) -> Self {
        Self::Immediate(resolved)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(resolved) => f.debug_tuple("Immediate").field(resolved).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Producer(_) => f.write_str("Producer(..)"),
            Self::Rejected(err) => f.debug_tuple("Rejected").field(err).finish(),
        }
    }
}

/// Observable step of a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Waiting for the outer computation.
    AwaitingOuter,
    /// Waiting for an envelope accessor to decode.
    AwaitingUnwrap,
    /// Finished with a value.
    Settled,
    /// Finished with an error.
    Failed,
}

enum Stage {
    AwaitingOuter(Deferred),
    AwaitingUnwrap(Decoding<Value>),
    Settled(Option<Value>),
    Failed(Option<ErrorInfo>),
}

impl Stage {
    fn after_outer(resolved: Resolved) -> Self {
        match guarded(move || unwrap_resolved(resolved)) {
            Ok(Unwrapped::Ready(value)) => Stage::Settled(Some(value)),
            Ok(Unwrapped::Pending(decoding)) => Stage::AwaitingUnwrap(decoding),
            Err(err) => Stage::Failed(Some(err)),
        }
    }
}

/// One in-flight resolution of a `set` call.
pub struct Resolution {
    stage: Stage,
}

impl Resolution {
    /// Begin resolving an input.
    ///
    /// Producers are invoked here. Immediate inputs that need no decoding
    /// leave the resolution already finished.
    pub fn start(input: Input) -> Self {
        let stage = match input {
            Input::Immediate(resolved) => Stage::after_outer(resolved),
            Input::Deferred(deferred) => Stage::AwaitingOuter(deferred),
            Input::Producer(producer) => match guarded(producer) {
                Ok(Ok(deferred)) => Stage::AwaitingOuter(deferred),
                Ok(Err(err)) | Err(err) => Stage::Failed(Some(err)),
            },
            Input::Rejected(err) => Stage::Failed(Some(err)),
        };
        Self { stage }
    }

    pub fn state(&self) -> ResolutionState {
        match self.stage {
            Stage::AwaitingOuter(_) => ResolutionState::AwaitingOuter,
            Stage::AwaitingUnwrap(_) => ResolutionState::AwaitingUnwrap,
            Stage::Settled(_) => ResolutionState::Settled,
            Stage::Failed(_) => ResolutionState::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Settled(_) | Stage::Failed(_))
    }

    /// Take the outcome of a finished resolution.
    ///
    /// Returns `None` while awaiting, or when the outcome was already taken.
    pub fn take_outcome(&mut self) -> Option<Result<Value, ErrorInfo>> {
        match &mut self.stage {
            Stage::Settled(value) => value.take().map(Ok),
            Stage::Failed(err) => err.take().map(Err),
            _ => None,
        }
    }
}

impl Future for Resolution {
    type Output = Result<Value, ErrorInfo>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            let next = match &mut this.stage {
                Stage::AwaitingOuter(deferred) => {
                    match guarded(|| deferred.as_mut().poll(cx)) {
                        Ok(Poll::Pending) => return Poll::Pending,
                        Ok(Poll::Ready(Ok(resolved))) => Stage::after_outer(resolved),
                        Ok(Poll::Ready(Err(err))) | Err(err) => Stage::Failed(Some(err)),
                    }
                }
                Stage::AwaitingUnwrap(decoding) => {
                    match guarded(|| decoding.as_mut().poll(cx)) {
                        Ok(Poll::Pending) => return Poll::Pending,
                        Ok(Poll::Ready(Ok(value))) => Stage::Settled(Some(value)),
                        Ok(Poll::Ready(Err(err))) | Err(err) => Stage::Failed(Some(err)),
                    }
                }
                Stage::Settled(_) | Stage::Failed(_) => break,
            };
            this.stage = next;
        }

        match this.take_outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => panic!("Resolution polled after completion"),
        }
    }
}

enum Unwrapped {
    Ready(Value),
    Pending(Decoding<Value>),
}

fn unwrap_resolved(resolved: Resolved) -> Unwrapped {
    let mut envelope = match resolved {
        Resolved::Value(value) => return Unwrapped::Ready(unwrap_value(value)),
        Resolved::Envelope(envelope) => envelope,
    };

    if let Some(json) = envelope.json() {
        return Unwrapped::Pending(json);
    }
    if let Some(data) = envelope.data() {
        return Unwrapped::Ready(data);
    }
    if let Some(text) = envelope.text() {
        return Unwrapped::Pending(text.map_ok(Value::String).boxed());
    }
    if let Some(body) = envelope.body() {
        return Unwrapped::Ready(body);
    }
    Unwrapped::Ready(envelope.into_value())
}

fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if let Some(data) = map.remove("data") {
                return data;
            }
            if let Some(body) = map.remove("body") {
                return body;
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Run user code, turning a panic into a resolution error.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, ErrorInfo> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(ErrorInfo::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future;
    use serde_json::json;

    /// Envelope exposing whichever accessors the test fills in.
    #[derive(Default)]
    struct FakeResponse {
        json: Option<Value>,
        data: Option<Value>,
        text: Option<String>,
        body: Option<Value>,
    }

    impl Envelope for FakeResponse {
        fn json(&mut self) -> Option<Decoding<Value>> {
            self.json.take().map(|v| future::ready(Ok(v)).boxed())
        }

        fn data(&mut self) -> Option<Value> {
            self.data.take()
        }

        fn text(&mut self) -> Option<Decoding<String>> {
            self.text.take().map(|t| future::ready(Ok(t)).boxed())
        }

        fn body(&mut self) -> Option<Value> {
            self.body.take()
        }

        fn into_value(self: Box<Self>) -> Value {
            json!({ "opaque": true })
        }
    }

    fn resolve_now(input: Input) -> Result<Value, ErrorInfo> {
        Resolution::start(input)
            .now_or_never()
            .expect("resolution should not be pending")
    }

    #[test]
    fn immediate_values_finish_at_start() {
        let mut resolution = Resolution::start(json!(42).into());
        assert_eq!(resolution.state(), ResolutionState::Settled);
        assert_eq!(resolution.take_outcome(), Some(Ok(json!(42))));
        assert_eq!(resolution.take_outcome(), None);
    }

    #[test]
    fn objects_unwrap_data_before_body() {
        let value = resolve_now(json!({ "data": [1, 2], "body": "raw", "status": 200 }).into());
        assert_eq!(value, Ok(json!([1, 2])));

        let value = resolve_now(json!({ "body": "raw", "status": 200 }).into());
        assert_eq!(value, Ok(json!("raw")));

        let value = resolve_now(json!({ "status": 200 }).into());
        assert_eq!(value, Ok(json!({ "status": 200 })));

        let value = resolve_now(json!({ "data": null }).into());
        assert_eq!(value, Ok(json!(null)));
    }

    #[test]
    fn envelope_accessor_precedence() {
        let full = FakeResponse {
            json: Some(json!({ "from": "json" })),
            data: Some(json!("data")),
            text: Some("text".into()),
            body: Some(json!("body")),
        };
        let mut resolution = Resolution::start(Input::envelope(full));
        assert_eq!(resolution.state(), ResolutionState::AwaitingUnwrap);
        assert_eq!(
            (&mut resolution).now_or_never(),
            Some(Ok(json!({ "from": "json" })))
        );

        let no_json = FakeResponse {
            data: Some(json!("data")),
            text: Some("text".into()),
            ..Default::default()
        };
        assert_eq!(resolve_now(Input::envelope(no_json)), Ok(json!("data")));

        let text_only = FakeResponse {
            text: Some("text".into()),
            body: Some(json!("body")),
            ..Default::default()
        };
        assert_eq!(resolve_now(Input::envelope(text_only)), Ok(json!("text")));

        let body_only = FakeResponse {
            body: Some(json!({ "data": "not unwrapped twice" })),
            ..Default::default()
        };
        assert_eq!(
            resolve_now(Input::envelope(body_only)),
            Ok(json!({ "data": "not unwrapped twice" }))
        );

        assert_eq!(
            resolve_now(Input::envelope(FakeResponse::default())),
            Ok(json!({ "opaque": true }))
        );
    }

    #[test]
    fn deferred_waits_for_outer_future() {
        let resolution = Resolution::start(Input::deferred(async { Ok::<_, String>(json!(7)) }));
        assert_eq!(resolution.state(), ResolutionState::AwaitingOuter);
        assert_eq!(resolution.now_or_never(), Some(Ok(json!(7))));
    }

    #[test]
    fn deferred_envelope_is_unwrapped() {
        let input = Input::deferred(async {
            Ok::<_, String>(Resolved::envelope(FakeResponse {
                json: Some(json!([1, 2, 3])),
                ..Default::default()
            }))
        });
        assert_eq!(resolve_now(input), Ok(json!([1, 2, 3])));
    }

    #[test]
    fn rejections_fail() {
        let input = Input::deferred(async { Err::<Value, _>("X") });
        assert_eq!(resolve_now(input), Err(ErrorInfo::new("X")));

        let input = Input::rejected(ErrorInfo::new("gone").with_code(410));
        let mut resolution = Resolution::start(input);
        assert_eq!(resolution.state(), ResolutionState::Failed);
        assert_eq!(resolution.take_outcome().unwrap().unwrap_err().code, Some(410));
    }

    #[test]
    fn producers_run_at_start() {
        let resolution = Resolution::start(Input::producer(|| async { Ok::<_, String>(json!("p")) }));
        assert_eq!(resolution.state(), ResolutionState::AwaitingOuter);
        assert_eq!(resolution.now_or_never(), Some(Ok(json!("p"))));

        let input = Input::try_producer(|| {
            Err::<future::Ready<Result<Value, String>>, _>("Function error".to_string())
        });
        let resolution = Resolution::start(input);
        assert_eq!(resolution.state(), ResolutionState::Failed);
    }

    #[test]
    fn panics_become_failures() {
        let input = Input::producer(|| -> future::Ready<Result<Value, String>> {
            panic!("producer exploded")
        });
        let mut resolution = Resolution::start(input);
        assert_eq!(
            resolution.take_outcome(),
            Some(Err(ErrorInfo::new("producer exploded")))
        );

        let input = Input::deferred(async {
            if true {
                panic!("future exploded");
            }
            Ok::<Value, String>(Value::Null)
        });
        assert_eq!(resolve_now(input), Err(ErrorInfo::new("future exploded")));
    }

    #[test]
    fn unserializable_values_are_rejected() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1);
        let mut resolution = Resolution::start(Input::value(map));
        assert_eq!(resolution.state(), ResolutionState::Failed);
        assert!(resolution.take_outcome().unwrap().is_err());

        assert_eq!(resolve_now(Input::value(vec![1, 2])), Ok(json!([1, 2])));
    }
}
