//! The explicit frame stack the Encoder State Machine drives (spec 4.4, 9).
//!
//! A tagged-variant dispatch rather than virtual inheritance, per spec 9's
//! design note: a sum type over `{Root, Object, Array, RecordStream,
//! ByteStream, AwaitingDeferred, TrailingEmit}` with a single `step`
//! operation (implemented on [`crate::encode::engine::Encoder`] rather than
//! on the frame itself, since stepping needs the encoder's shared output
//! buffer, depth counter, and visited set).

use std::future::Future;
use std::pin::Pin;

use asupersync::stream::Stream;
use bytes::Bytes;

use crate::error::EncodeError;
use crate::value::Value;

/// Where a value being submitted sits relative to its parent, i.e. what
/// the spec's "separator-handler" needs to know to do its job.
pub(crate) enum Slot {
    Root,
    ObjectValue(String),
    ArrayItem(usize),
}

impl Slot {
    /// The key a replacer function sees (spec 4.3: `(key-as-string,
    /// value)`), and what a `CircularStructure` error reports as the
    /// position the cycle was detected at.
    pub(crate) fn label(&self) -> String {
        match self {
            Self::Root => String::new(),
            Self::ObjectValue(key) => key.clone(),
            Self::ArrayItem(index) => index.to_string(),
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, EncodeError>>>>;
type BoxedRecordStream = Pin<Box<dyn Stream<Item = Result<Value, EncodeError>>>>;
type BoxedByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, EncodeError>>>>;

pub(crate) enum Frame {
    /// One-shot: on its first step, pops itself and submits the root value
    /// (spec 4.4's Root frame).
    Root(Option<Value>),
    Object {
        /// Snapshotted at push time (spec 4.4: "push OBJECT frame with key
        /// list snapshotted at this moment"); the allow-list replacer
        /// shape has already filtered this by the time it's stored here.
        entries: Vec<(String, Value)>,
        index: usize,
        /// `false` until the first child has been emitted (spec 3
        /// invariant); drives the object-separator-handler's comma logic.
        first: bool,
        /// `Rc::as_ptr` identity of the object, for visited-set release.
        ptr: usize,
    },
    Array {
        items: Vec<Value>,
        index: usize,
        ptr: usize,
    },
    AwaitingDeferred {
        future: BoxedFuture,
        slot: Slot,
    },
    RecordStreamReader {
        stream: BoxedRecordStream,
        index: usize,
    },
    ByteStreamReader {
        stream: BoxedByteStream,
    },
    /// Emits a fixed closing bracket then pops. Used so a `RECORD_STREAM`
    /// terminates with `]` at the correct depth and indentation even
    /// though that decision (were any items ever emitted?) is only known
    /// once the `RecordStreamReader` frame above it has drained. Carries
    /// the stream's `Rc::as_ptr` identity so the visited set releases it
    /// at the same point `Object`/`Array` release theirs: when the
    /// container's closing bracket is actually emitted.
    TrailingEmit {
        bracket: char,
        had_items: bool,
        ptr: usize,
    },
}
