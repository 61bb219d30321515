//! The in-memory value graph the encoder walks (spec section 3).
//!
//! Unlike a dynamically-typed source runtime, classification here is paid
//! once, at construction time: [`Value`]'s variants already are the six
//! categories spec 4.1's Type Classifier computes.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use asupersync::stream::Stream;

use crate::error::EncodeError;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    /// Distinct from `Null` because object-key elision (spec 4.4, section 8
    /// property 6) depends on telling the two apart.
    Undefined,
}

impl Primitive {
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Null
        }
    }
}

pub type ObjectRef = Rc<RefCell<Vec<(String, Value)>>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// State of a [`Deferred`] handle. Shared via `Rc` so more than one
/// reference to the same handle observes the same outcome. `EncodeError`
/// is cheaply `Clone`, so a cached rejection can be replayed to every
/// holder without re-polling the underlying future.
pub enum DeferredState {
    Pending(Pin<Box<dyn Future<Output = std::result::Result<Value, EncodeError>>>>),
    Resolved(Value),
    Rejected(EncodeError),
}

pub type DeferredRef = Rc<RefCell<DeferredState>>;

/// Adapts a shared [`DeferredState`] into a plain `Future`: the Rust-native
/// stand-in for spec 4.7's `then`/`catch` event subscription. A
/// `Poll::Pending` result here *is* spec's `awaiting = true`.
struct DeferredPoll(DeferredRef);

impl Future for DeferredPoll {
    type Output = std::result::Result<Value, EncodeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.0.borrow_mut();
        match &mut *state {
            DeferredState::Pending(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(Ok(value)) => {
                    *state = DeferredState::Resolved(value.clone());
                    Poll::Ready(Ok(value))
                }
                Poll::Ready(Err(err)) => {
                    *state = DeferredState::Rejected(err.clone());
                    Poll::Ready(Err(err))
                }
                Poll::Pending => Poll::Pending,
            },
            DeferredState::Resolved(value) => Poll::Ready(Ok(value.clone())),
            DeferredState::Rejected(err) => Poll::Ready(Err(err.clone())),
        }
    }
}

/// A single-shot asynchronous result handle (spec 3, 4.4, 4.7).
#[derive(Clone)]
pub struct Deferred(pub(crate) DeferredRef);

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = std::result::Result<Value, EncodeError>> + 'static,
    {
        Self(Rc::new(RefCell::new(DeferredState::Pending(Box::pin(
            future,
        )))))
    }

    /// Wrap a future whose error type is not already [`EncodeError`],
    /// mapping a rejection through [`EncodeError::deferred_rejected`].
    pub fn from_result<F, E>(future: F) -> Self
    where
        F: Future<Output = std::result::Result<Value, E>> + 'static,
        E: std::error::Error + 'static,
    {
        Self::new(async move { future.await.map_err(EncodeError::deferred_rejected) })
    }

    #[must_use]
    pub fn resolved(value: Value) -> Self {
        Self(Rc::new(RefCell::new(DeferredState::Resolved(value))))
    }

    /// Adapt this handle into a boxed, pinned future the encoder can poll
    /// directly from an `AwaitingDeferred` frame.
    pub(crate) fn into_future(
        self,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Value, EncodeError>>>> {
        Box::pin(DeferredPoll(self.0))
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Whether an incremental source is safe to consume (spec 5's input stream
/// contract: must not already be exhausted, must not already be flowing).
pub enum StreamState<T> {
    Paused(Pin<Box<dyn Stream<Item = std::result::Result<T, EncodeError>>>>),
    /// Currently being driven by a frame on the stack, or already drained
    /// by one — either way it cannot be submitted again.
    Reading,
    /// Already exhausted before being submitted (`StreamEnded`).
    Ended,
    /// Already in flowing/push mode before being submitted
    /// (`StreamStateInvalid`).
    Flowing,
}

pub type ByteStreamRef = Rc<RefCell<StreamState<bytes::Bytes>>>;
pub type RecordStreamRef = Rc<RefCell<StreamState<Value>>>;

type BoxedStream<T> = Pin<Box<dyn Stream<Item = std::result::Result<T, EncodeError>>>>;

fn take_stream<T>(cell: &RefCell<StreamState<T>>) -> std::result::Result<BoxedStream<T>, EncodeError> {
    {
        let state = cell.borrow();
        match &*state {
            StreamState::Ended => return Err(EncodeError::StreamEnded),
            StreamState::Reading | StreamState::Flowing => {
                return Err(EncodeError::StreamStateInvalid);
            }
            StreamState::Paused(_) => {}
        }
    }
    match std::mem::replace(&mut *cell.borrow_mut(), StreamState::Reading) {
        StreamState::Paused(stream) => Ok(stream),
        _ => unreachable!("state checked immediately above"),
    }
}

/// An incremental source of raw text fragments, spliced verbatim (spec
/// 4.1, 4.4's byte-stream-frame-handler).
#[derive(Clone)]
pub struct ByteStream(pub(crate) ByteStreamRef);

impl ByteStream {
    pub fn paused<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<bytes::Bytes, EncodeError>> + 'static,
    {
        Self(Rc::new(RefCell::new(StreamState::Paused(Box::pin(
            stream,
        )))))
    }

    #[must_use]
    pub fn already_flowing() -> Self {
        Self(Rc::new(RefCell::new(StreamState::Flowing)))
    }

    #[must_use]
    pub fn already_ended() -> Self {
        Self(Rc::new(RefCell::new(StreamState::Ended)))
    }

    pub(crate) fn take(self) -> std::result::Result<BoxedStream<bytes::Bytes>, EncodeError> {
        take_stream(&self.0)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteStream(..)")
    }
}

/// An incremental source of values, each encoded as an array element (spec
/// 4.1, 4.4's record-stream-frame-handler).
#[derive(Clone)]
pub struct RecordStream(pub(crate) RecordStreamRef);

impl RecordStream {
    pub fn paused<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Value, EncodeError>> + 'static,
    {
        Self(Rc::new(RefCell::new(StreamState::Paused(Box::pin(
            stream,
        )))))
    }

    #[must_use]
    pub fn already_flowing() -> Self {
        Self(Rc::new(RefCell::new(StreamState::Flowing)))
    }

    #[must_use]
    pub fn already_ended() -> Self {
        Self(Rc::new(RefCell::new(StreamState::Ended)))
    }

    pub(crate) fn take(self) -> std::result::Result<BoxedStream<Value>, EncodeError> {
        take_stream(&self.0)
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordStream(..)")
    }
}

/// Stands in for the source runtime's duck-typed `toJSON` hook (spec 4.3):
/// a value that resolves to a [`Value`] lazily, at the point the encoder
/// actually visits that slot.
pub trait ToJson {
    fn to_json(&self, key: &str) -> crate::error::Result<Value>;
}

/// The value graph node the encoder walks.
#[derive(Clone)]
pub enum Value {
    Primitive(Primitive),
    Object(ObjectRef),
    Array(ArrayRef),
    Deferred(Deferred),
    ByteStream(ByteStream),
    RecordStream(RecordStream),
    Custom(Rc<dyn ToJson>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Array(_) => f.write_str("Array(..)"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::ByteStream(_) => f.write_str("ByteStream(..)"),
            Self::RecordStream(_) => f.write_str("RecordStream(..)"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Value {
    #[must_use]
    pub fn object(entries: Vec<(String, Value)>) -> Self {
        Self::Object(Rc::new(RefCell::new(entries)))
    }

    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn null() -> Self {
        Self::Primitive(Primitive::Null)
    }

    #[must_use]
    pub fn undefined() -> Self {
        Self::Primitive(Primitive::Undefined)
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Self::Primitive(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Primitive(Primitive::String(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Primitive(Primitive::String(value.to_string()))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Primitive(Primitive::Bool(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Primitive(Primitive::from_f64(value))
    }
}

#[allow(clippy::cast_precision_loss)]
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Primitive(Primitive::Number(value as f64))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::array(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Primitive(Primitive::Null),
            serde_json::Value::Bool(value) => Self::Primitive(Primitive::Bool(value)),
            serde_json::Value::Number(value) => {
                let number = value
                    .as_f64()
                    .unwrap_or_else(|| value.to_string().parse::<f64>().unwrap_or(f64::NAN));
                Self::Primitive(Primitive::from_f64(number))
            }
            serde_json::Value::String(value) => Self::Primitive(Primitive::String(value)),
            serde_json::Value::Array(values) => {
                Self::array(values.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    entries.push((key, Self::from(value)));
                }
                Self::object(entries)
            }
        }
    }
}

/// Fails when `value` holds an async sub-source with no synchronous
/// materialization (`Deferred`, `ByteStream`, `RecordStream`, `Custom`).
impl TryFrom<Value> for serde_json::Value {
    type Error = EncodeError;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Primitive(p) => Ok(match p {
                Primitive::String(s) => Self::String(s),
                Primitive::Number(n) => {
                    serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
                }
                Primitive::Bool(b) => Self::Bool(b),
                Primitive::Null | Primitive::Undefined => Self::Null,
            }),
            Value::Array(items) => {
                let items = Rc::try_unwrap(items)
                    .map(RefCell::into_inner)
                    .unwrap_or_else(|rc| rc.borrow().clone());
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::try_from(item)?);
                }
                Ok(Self::Array(out))
            }
            Value::Object(entries) => {
                let entries = Rc::try_unwrap(entries)
                    .map(RefCell::into_inner)
                    .unwrap_or_else(|rc| rc.borrow().clone());
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, Self::try_from(value)?);
                }
                Ok(Self::Object(map))
            }
            Value::Deferred(_) | Value::ByteStream(_) | Value::RecordStream(_) => {
                Err(EncodeError::unsupported_type(
                    "async sub-source has no synchronous JSON representation",
                ))
            }
            Value::Custom(hook) => {
                let resolved = hook.to_json("")?;
                Self::try_from(resolved)
            }
        }
    }
}
