//! Async sub-source behavior: `Deferred` transparency, `RecordStream`/
//! `ByteStream` encoding, chunk invariance under varying pull sizes, and a
//! real (non-stub) waker that proves suspension actually requests a
//! wake-up rather than relying on a caller that just busy-polls forever.

mod common;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use asupersync::stream::Stream;
use bytes::Bytes;

use fluxjson::{ByteStream, Deferred, EncodeError, Encoder, RecordStream, Value};

/// A future that parks on its first poll (waking the task that polled it),
/// then resolves on the next poll. Stands in for an actual I/O wait.
struct FlipFlop {
    polled_once: bool,
    result: Option<Result<Value, EncodeError>>,
}

impl FlipFlop {
    fn new(result: Result<Value, EncodeError>) -> Self {
        Self {
            polled_once: false,
            result: Some(result),
        }
    }
}

impl Future for FlipFlop {
    type Output = Result<Value, EncodeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.polled_once {
            self.polled_once = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(self.result.take().expect("polled after completion"))
        }
    }
}

/// A stream that immediately yields a fixed, in-order sequence of items —
/// used wherever a test drains with a no-op waker and can't tolerate a
/// `Pending` that nothing will ever wake.
struct ScriptedStream<T> {
    items: VecDeque<Result<T, EncodeError>>,
}

impl<T> ScriptedStream<T> {
    fn new(items: Vec<Result<T, EncodeError>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl<T: Unpin> Stream for ScriptedStream<T> {
    type Item = Result<T, EncodeError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.items.pop_front() {
            Some(item) => Poll::Ready(Some(item)),
            None => Poll::Ready(None),
        }
    }
}

/// A stream that parks (and wakes its task) exactly once, then behaves like
/// [`ScriptedStream`] — for the one test that specifically checks a
/// suspended record stream's wake-up is observed.
struct ParksOnceStream<T> {
    parked: bool,
    inner: ScriptedStream<T>,
}

impl<T> ParksOnceStream<T> {
    fn new(items: Vec<Result<T, EncodeError>>) -> Self {
        Self {
            parked: false,
            inner: ScriptedStream::new(items),
        }
    }
}

impl<T: Unpin> Stream for ParksOnceStream<T> {
    type Item = Result<T, EncodeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.parked {
            self.parked = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[test]
fn deferred_is_transparent_in_object_value_position() {
    let deferred = Deferred::new(FlipFlop::new(Ok(Value::from("resolved"))));
    let value = Value::object(vec![
        ("before".into(), Value::from(1.0)),
        ("async".into(), Value::Deferred(deferred)),
        ("after".into(), Value::from(2.0)),
    ]);

    let (waker, counter) = common::counting_waker();
    let mut cx = Context::from_waker(&waker);
    let mut encoder = Encoder::new(value, None);

    // First pull: reaches the deferred slot and suspends.
    match encoder.poll_pull(&mut cx, 0) {
        Poll::Pending => {}
        other => panic!("expected suspension on the deferred slot, got {other:?}"),
    }
    assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Second pull: the future is now ready, drains to completion.
    let mut out = String::new();
    loop {
        match encoder.poll_pull(&mut cx, 0) {
            Poll::Ready(Some(Ok(chunk))) => {
                out.push_str(std::str::from_utf8(&chunk).unwrap());
            }
            Poll::Ready(Some(Err(err))) => panic!("unexpected error: {err}"),
            Poll::Ready(None) => break,
            Poll::Pending => panic!("unexpected second suspension"),
        }
    }
    assert_eq!(out, r#"{"before":1,"async":"resolved","after":2}"#);
}

#[test]
fn already_resolved_deferred_needs_no_suspension() {
    let deferred = Deferred::resolved(Value::from(7.0));
    let value = Value::object(vec![("x".into(), Value::Deferred(deferred))]);
    let out = common::drain(Encoder::new(value, None)).unwrap();
    assert_eq!(out, r#"{"x":7}"#);
}

#[test]
fn record_stream_encodes_each_item_as_an_array_element() {
    let items = vec![
        Ok(Value::from(1.0)),
        Ok(Value::from(2.0)),
        Ok(Value::object(vec![("k".into(), Value::from("v"))])),
    ];
    let stream = RecordStream::paused(ScriptedStream::new(items));
    let value = Value::object(vec![
        ("label".into(), Value::from("records")),
        ("items".into(), Value::RecordStream(stream)),
    ]);
    let out = common::drain(Encoder::new(value, None)).unwrap();
    assert_eq!(out, r#"{"label":"records","items":[1,2,{"k":"v"}]}"#);
}

#[test]
fn record_stream_suspension_wakes_the_consumer() {
    let stream = RecordStream::paused(ParksOnceStream::new(vec![Ok(Value::from(1.0))]));
    let value = Value::object(vec![("items".into(), Value::RecordStream(stream))]);

    let (waker, counter) = common::counting_waker();
    let mut cx = Context::from_waker(&waker);
    let mut encoder = Encoder::new(value, None);

    match encoder.poll_pull(&mut cx, 0) {
        Poll::Pending => {}
        other => panic!("expected suspension while the record stream is parked, got {other:?}"),
    }
    assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);

    let mut out = String::new();
    loop {
        match encoder.poll_pull(&mut cx, 0) {
            Poll::Ready(Some(Ok(chunk))) => out.push_str(std::str::from_utf8(&chunk).unwrap()),
            Poll::Ready(Some(Err(err))) => panic!("unexpected error: {err}"),
            Poll::Ready(None) => break,
            Poll::Pending => panic!("unexpected second suspension"),
        }
    }
    assert_eq!(out, r#"{"items":[1]}"#);
}

#[test]
fn record_stream_ending_with_zero_items_yields_empty_array() {
    let stream = RecordStream::paused(ScriptedStream::<Value>::new(vec![]));
    let value = Value::object(vec![("items".into(), Value::RecordStream(stream))]);
    let out = common::drain(Encoder::new(value, None)).unwrap();
    assert_eq!(out, r#"{"items":[]}"#);
}

#[test]
fn byte_stream_is_spliced_verbatim() {
    let chunks = vec![
        Ok(Bytes::from_static(b"\"hel")),
        Ok(Bytes::from_static(b"lo\"")),
    ];
    let stream = ByteStream::paused(ScriptedStream::new(chunks));
    let value = Value::array(vec![Value::from(1.0), Value::ByteStream(stream)]);
    let out = common::drain(Encoder::new(value, None)).unwrap();
    assert_eq!(out, r#"[1,"hello"]"#);
}

#[test]
fn output_is_invariant_to_the_consumers_pull_size() {
    let build_value = || {
        let items = vec![
            Ok(Value::from(1.0)),
            Ok(Value::from(2.0)),
            Ok(Value::from("three")),
        ];
        let stream = RecordStream::paused(ScriptedStream::new(items));
        Value::object(vec![
            ("a".into(), Value::from(serde_json::json!({"nested": [1, 2, 3]}))),
            ("stream".into(), Value::RecordStream(stream)),
        ])
    };

    let whole = common::drain(Encoder::new(build_value(), None)).unwrap();

    for pull_size in [1usize, 2, 3, 8, 64, 4096] {
        let chunks = common::drain_chunks(Encoder::new(build_value(), None), pull_size).unwrap();
        assert_eq!(chunks.concat(), whole, "pull_size={pull_size}");
    }
}
