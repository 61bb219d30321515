//! Encoder State Machine, Output Buffer, Pull Driver, and Async Suspension
//! Manager (spec 4.4, 4.5, 4.6, 4.7) — the core of the crate.
//!
//! A `Vec<Frame>` stack with a flat `step` dispatch replaces native
//! recursion (spec 9's Design Note): each open container or async wait is
//! a frame with its own piece of the step loop, which makes suspension
//! trivial — the loop simply returns when the top frame parks.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use asupersync::stream::Stream;
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::classify::{self, Category};
use crate::encode::frame::{Frame, Slot};
use crate::encode::primitives;
use crate::encode::replacer;
use crate::error::EncodeError;
use crate::options::{EncodeOptions, ResolvedEncodeOptions, resolve_encode_options};
use crate::value::{ArrayRef, ObjectRef, Primitive, Value};

enum StepOutcome {
    Continue,
    Awaiting,
}

/// Pull-driven streaming JSON encoder.
///
/// Implements [`asupersync::stream::Stream`] so an ordinary consumer can
/// drive it with `StreamExt::next()`; [`Encoder::poll_pull`] additionally
/// exposes the per-pull size hint spec 4.5 requires (the `Stream` impl
/// alone only has a fixed ambient high-water mark).
pub struct Encoder {
    stack: Vec<Frame>,
    /// Currently-open `OBJECT`/`ARRAY`/`RECORD_STREAM` values, keyed on
    /// `Rc` pointer identity (spec 3's visited set).
    visited: HashSet<usize>,
    depth: usize,
    buffer: String,
    high_water_mark: usize,
    /// Reentrancy guard (spec 4.5's `processing` flag). Safe `&mut self`
    /// polling already rules out literal reentrancy; this remains as a
    /// defensive assertion rather than a functional requirement.
    processing: bool,
    errored: bool,
    /// Set once the frame stack has drained and its final chunk has been
    /// handed back; distinguishes "just emptied, one more chunk to flush"
    /// from "already reported done" so the stream terminates exactly once.
    finished: bool,
    /// An error that arrived while `buffer` still held unflushed bytes.
    /// Surfaced only after those bytes have been handed to the consumer,
    /// so a caller sees everything that was actually produced before the
    /// failure.
    pending_error: Option<EncodeError>,
    options: ResolvedEncodeOptions,
}

impl Encoder {
    #[must_use]
    pub fn new(value: impl Into<Value>, options: Option<EncodeOptions>) -> Self {
        let resolved = resolve_encode_options(options);
        let high_water_mark = resolved.high_water_mark;
        Self {
            stack: vec![Frame::Root(Some(value.into()))],
            visited: HashSet::new(),
            depth: 0,
            buffer: String::new(),
            high_water_mark,
            processing: false,
            errored: false,
            finished: false,
            pending_error: None,
            options: resolved,
        }
    }

    /// Pull up to `max_len` bytes worth of buffering before flushing
    /// (spec 4.5: "The consumer provides a requested read size"). A
    /// `max_len` of `0` falls back to the encoder's configured high-water
    /// mark.
    pub fn poll_pull(
        &mut self,
        cx: &mut Context<'_>,
        max_len: usize,
    ) -> Poll<Option<Result<Bytes, EncodeError>>> {
        if max_len > 0 {
            self.high_water_mark = max_len;
        }
        self.drive(cx)
    }

    fn drive(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, EncodeError>>> {
        let _span = tracing::trace_span!("encoder_drive", stack_depth = self.stack.len()).entered();
        if self.errored {
            return match self.pending_error.take() {
                Some(err) => Poll::Ready(Some(Err(err))),
                None => Poll::Ready(None),
            };
        }
        if self.finished {
            return Poll::Ready(None);
        }
        debug_assert!(!self.processing, "Encoder::drive called reentrantly");
        self.processing = true;

        let outcome = loop {
            if self.stack.is_empty() {
                break Ok(true);
            }
            if self.buffer.len() >= self.high_water_mark {
                break Ok(false);
            }
            match self.step(cx) {
                Ok(StepOutcome::Continue) => continue,
                Ok(StepOutcome::Awaiting) => {
                    trace!(stack_depth = self.stack.len(), "suspending on async sub-source");
                    break Err(None);
                }
                Err(err) => break Err(Some(err)),
            }
        };

        self.processing = false;
        match outcome {
            Ok(drained) => {
                if drained {
                    self.finished = true;
                }
                if drained && self.buffer.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(self.take_chunk())))
                }
            }
            Err(None) => Poll::Pending,
            Err(Some(err)) => {
                self.destroy();
                if self.buffer.is_empty() {
                    Poll::Ready(Some(Err(err)))
                } else {
                    self.pending_error = Some(err);
                    Poll::Ready(Some(Ok(self.take_chunk())))
                }
            }
        }
    }

    fn take_chunk(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.buffer).into_bytes())
    }

    /// Destroy the encoder on a fatal error (spec 7): discard the stack
    /// and visited set, drop any pending async subscriptions (dropping
    /// the boxed futures/streams held by the stack does this), and stop
    /// scheduling further work.
    fn destroy(&mut self) {
        self.stack.clear();
        self.visited.clear();
        self.errored = true;
    }

    fn indent_unit(&self) -> Option<String> {
        self.options.indent.unit()
    }

    fn push_indent(&mut self, depth: usize, unit: &str) {
        for _ in 0..depth {
            self.buffer.push_str(unit);
        }
    }

    fn step(&mut self, cx: &mut Context<'_>) -> Result<StepOutcome, EncodeError> {
        match self.stack.last() {
            None => unreachable!("drive() checks stack.is_empty() before calling step()"),
            Some(Frame::Root(_)) => self.step_root(),
            Some(Frame::Object { .. }) => self.step_object(),
            Some(Frame::Array { .. }) => self.step_array(),
            Some(Frame::AwaitingDeferred { .. }) => self.step_deferred(cx),
            Some(Frame::RecordStreamReader { .. }) => self.step_record_stream(cx),
            Some(Frame::ByteStreamReader { .. }) => self.step_byte_stream(cx),
            Some(Frame::TrailingEmit { .. }) => Ok(self.step_trailing_emit()),
        }
    }

    fn step_root(&mut self) -> Result<StepOutcome, EncodeError> {
        let Some(Frame::Root(slot)) = self.stack.pop() else {
            unreachable!()
        };
        let value = slot.expect("root frame stepped twice");
        self.submit(value, Slot::Root)?;
        Ok(StepOutcome::Continue)
    }

    fn step_object(&mut self) -> Result<StepOutcome, EncodeError> {
        let next = {
            let Some(Frame::Object { entries, index, .. }) = self.stack.last_mut() else {
                unreachable!()
            };
            if *index >= entries.len() {
                None
            } else {
                let i = *index;
                *index += 1;
                Some(entries[i].clone())
            }
        };
        match next {
            Some((key, value)) => {
                self.submit(value, Slot::ObjectValue(key))?;
                Ok(StepOutcome::Continue)
            }
            None => {
                self.close_object();
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn step_array(&mut self) -> Result<StepOutcome, EncodeError> {
        let next = {
            let Some(Frame::Array { items, index, .. }) = self.stack.last_mut() else {
                unreachable!()
            };
            if *index >= items.len() {
                None
            } else {
                let i = *index;
                *index += 1;
                Some((i, items[i].clone()))
            }
        };
        match next {
            Some((i, value)) => {
                self.submit(value, Slot::ArrayItem(i))?;
                Ok(StepOutcome::Continue)
            }
            None => {
                self.close_array();
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn step_deferred(&mut self, cx: &mut Context<'_>) -> Result<StepOutcome, EncodeError> {
        enum Outcome {
            Resolved(Value),
            Rejected(EncodeError),
            Pending,
        }
        let outcome = {
            let Some(Frame::AwaitingDeferred { future, .. }) = self.stack.last_mut() else {
                unreachable!()
            };
            match future.as_mut().poll(cx) {
                Poll::Ready(Ok(value)) => Outcome::Resolved(value),
                Poll::Ready(Err(err)) => Outcome::Rejected(err),
                Poll::Pending => Outcome::Pending,
            }
        };
        match outcome {
            Outcome::Pending => Ok(StepOutcome::Awaiting),
            Outcome::Rejected(err) => Err(err),
            Outcome::Resolved(value) => {
                let Some(Frame::AwaitingDeferred { slot, .. }) = self.stack.pop() else {
                    unreachable!()
                };
                self.submit(value, slot)?;
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn step_record_stream(&mut self, cx: &mut Context<'_>) -> Result<StepOutcome, EncodeError> {
        enum Outcome {
            Item(usize, Value),
            EndedWith(usize),
            Rejected(EncodeError),
            Pending,
        }
        let outcome = {
            let Some(Frame::RecordStreamReader { stream, index }) = self.stack.last_mut() else {
                unreachable!()
            };
            match stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    let i = *index;
                    *index += 1;
                    Outcome::Item(i, value)
                }
                Poll::Ready(Some(Err(err))) => Outcome::Rejected(err),
                // Spec 4.4's separate "no data" vs "ended" signals collapse
                // onto Poll's variants: Ready(None) is genuinely terminal,
                // Pending means "try again once woken". A stream that ends
                // with zero items before ever returning Pending pops here
                // immediately, yielding `[]` — spec 9's open question,
                // resolved as intentional.
                Poll::Ready(None) => Outcome::EndedWith(*index),
                Poll::Pending => Outcome::Pending,
            }
        };
        match outcome {
            Outcome::Pending => Ok(StepOutcome::Awaiting),
            Outcome::Rejected(err) => Err(err),
            Outcome::Item(index, value) => {
                self.submit(value, Slot::ArrayItem(index))?;
                Ok(StepOutcome::Continue)
            }
            Outcome::EndedWith(count) => {
                self.stack.pop();
                if let Some(Frame::TrailingEmit { had_items, .. }) = self.stack.last_mut() {
                    *had_items = count > 0;
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn step_byte_stream(&mut self, cx: &mut Context<'_>) -> Result<StepOutcome, EncodeError> {
        enum Outcome {
            Chunk(Bytes),
            Ended,
            Rejected(EncodeError),
            Pending,
        }
        let outcome = {
            let Some(Frame::ByteStreamReader { stream }) = self.stack.last_mut() else {
                unreachable!()
            };
            match stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => Outcome::Chunk(chunk),
                Poll::Ready(Some(Err(err))) => Outcome::Rejected(err),
                Poll::Ready(None) => Outcome::Ended,
                Poll::Pending => Outcome::Pending,
            }
        };
        match outcome {
            Outcome::Pending => Ok(StepOutcome::Awaiting),
            Outcome::Rejected(err) => Err(err),
            Outcome::Chunk(chunk) => {
                // Spliced verbatim: the producer asserts its chunks are
                // already valid JSON content in context (spec 4.4).
                match std::str::from_utf8(&chunk) {
                    Ok(text) => self.buffer.push_str(text),
                    Err(_) => {
                        return Err(EncodeError::unsupported_type(
                            "byte-stream chunk was not valid UTF-8",
                        ));
                    }
                }
                Ok(StepOutcome::Continue)
            }
            Outcome::Ended => {
                self.stack.pop();
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn step_trailing_emit(&mut self) -> StepOutcome {
        let Some(Frame::TrailingEmit {
            bracket,
            had_items,
            ptr,
        }) = self.stack.last()
        else {
            unreachable!()
        };
        let (bracket, had_items, ptr) = (*bracket, *had_items, *ptr);
        if had_items {
            if let Some(unit) = self.indent_unit() {
                self.buffer.push('\n');
                self.push_indent(self.depth - 1, &unit);
            }
        }
        self.buffer.push(bracket);
        self.depth -= 1;
        self.visited.remove(&ptr);
        self.stack.pop();
        StepOutcome::Continue
    }

    /// The recursive entry point (spec 4.4): apply the replacer pipeline,
    /// classify, and dispatch.
    fn submit(&mut self, value: Value, slot: Slot) -> Result<(), EncodeError> {
        let key = slot.label();
        let value = replacer::resolve_value(&key, value, self.options.replacer.as_ref())?;

        match classify::classify(value) {
            Category::Primitive(Primitive::Undefined) if matches!(slot, Slot::ObjectValue(_)) => {
                // Elided entirely: neither key nor separator appears
                // (section 8 property 6).
                Ok(())
            }
            Category::Primitive(p) => {
                self.write_separator(&slot);
                primitives::write_primitive(&mut self.buffer, &p);
                Ok(())
            }
            Category::Object(handle) => {
                self.write_separator(&slot);
                self.open_object(handle, &slot)
            }
            Category::Array(handle) => {
                self.write_separator(&slot);
                self.open_array(handle, &slot)
            }
            Category::Deferred(deferred) => {
                self.stack.push(Frame::AwaitingDeferred {
                    future: deferred.into_future(),
                    slot,
                });
                Ok(())
            }
            Category::RecordStream(stream) => {
                self.write_separator(&slot);
                self.open_record_stream(stream, &slot)
            }
            Category::ByteStream(stream) => {
                self.write_separator(&slot);
                self.open_byte_stream(stream)
            }
        }
    }

    fn write_separator(&mut self, slot: &Slot) {
        match slot {
            Slot::Root => {}
            Slot::ArrayItem(index) => {
                if *index != 0 {
                    self.buffer.push(',');
                }
                if let Some(unit) = self.indent_unit() {
                    self.buffer.push('\n');
                    self.push_indent(self.depth, &unit);
                }
            }
            Slot::ObjectValue(key) => {
                // Object-separator-handler (spec 4.4): first invocation
                // sets `first = true` with no comma; later invocations
                // emit a leading comma.
                let emit_comma = match self.stack.last_mut() {
                    Some(Frame::Object { first, .. }) => {
                        if *first {
                            true
                        } else {
                            *first = true;
                            false
                        }
                    }
                    _ => false,
                };
                if emit_comma {
                    self.buffer.push(',');
                }
                match self.indent_unit() {
                    Some(unit) => {
                        self.buffer.push('\n');
                        self.push_indent(self.depth, &unit);
                        primitives::write_string(&mut self.buffer, key);
                        self.buffer.push_str(": ");
                    }
                    None => {
                        primitives::write_string(&mut self.buffer, key);
                        self.buffer.push(':');
                    }
                }
            }
        }
    }

    fn open_object(&mut self, handle: ObjectRef, slot: &Slot) -> Result<(), EncodeError> {
        let ptr = Rc::as_ptr(&handle) as usize;
        if !self.visited.insert(ptr) {
            let path = slot.label();
            warn!(path = %path, "circular structure detected");
            return Err(EncodeError::circular_structure(path));
        }
        self.buffer.push('{');
        self.depth += 1;
        let entries = replacer::filter_object_entries(
            handle.borrow().clone(),
            self.options.replacer.as_ref(),
        );
        trace!(depth = self.depth, entries = entries.len(), "push object frame");
        self.stack.push(Frame::Object {
            entries,
            index: 0,
            first: false,
            ptr,
        });
        Ok(())
    }

    fn close_object(&mut self) {
        let Some(Frame::Object { first, ptr, .. }) = self.stack.last() else {
            unreachable!()
        };
        let (had_items, ptr) = (*first, *ptr);
        if had_items {
            if let Some(unit) = self.indent_unit() {
                self.buffer.push('\n');
                self.push_indent(self.depth - 1, &unit);
            }
        }
        self.buffer.push('}');
        self.depth -= 1;
        self.visited.remove(&ptr);
        self.stack.pop();
        trace!(depth = self.depth, "pop object frame");
    }

    fn open_array(&mut self, handle: ArrayRef, slot: &Slot) -> Result<(), EncodeError> {
        let ptr = Rc::as_ptr(&handle) as usize;
        if !self.visited.insert(ptr) {
            let path = slot.label();
            warn!(path = %path, "circular structure detected");
            return Err(EncodeError::circular_structure(path));
        }
        self.buffer.push('[');
        self.depth += 1;
        let items = handle.borrow().clone();
        trace!(depth = self.depth, items = items.len(), "push array frame");
        self.stack.push(Frame::Array {
            items,
            index: 0,
            ptr,
        });
        Ok(())
    }

    fn close_array(&mut self) {
        let Some(Frame::Array { items, ptr, .. }) = self.stack.last() else {
            unreachable!()
        };
        let (had_items, ptr) = (!items.is_empty(), *ptr);
        if had_items {
            if let Some(unit) = self.indent_unit() {
                self.buffer.push('\n');
                self.push_indent(self.depth - 1, &unit);
            }
        }
        self.buffer.push(']');
        self.depth -= 1;
        self.visited.remove(&ptr);
        self.stack.pop();
        trace!(depth = self.depth, "pop array frame");
    }

    /// `RECORD_STREAM` values join the same visited set `Object`/`Array`
    /// use (spec 3: "a set of currently-open OBJECT, ARRAY, and
    /// RECORD_STREAM values"). A record stream can never legitimately be
    /// submitted twice as non-cyclic siblings — `take_stream`'s `Reading`
    /// guard already forbids that — so a repeat submission is always the
    /// ancestor-cycle case section 8 property 3 requires, and is reported
    /// as `CircularStructure` rather than `StreamStateInvalid`.
    fn open_record_stream(
        &mut self,
        stream: crate::value::RecordStream,
        slot: &Slot,
    ) -> Result<(), EncodeError> {
        let ptr = Rc::as_ptr(&stream.0) as usize;
        if !self.visited.insert(ptr) {
            let path = slot.label();
            warn!(path = %path, "circular structure detected");
            return Err(EncodeError::circular_structure(path));
        }
        let stream = match stream.take() {
            Ok(stream) => stream,
            Err(err) => {
                self.visited.remove(&ptr);
                return Err(err);
            }
        };
        self.buffer.push('[');
        self.depth += 1;
        debug!(depth = self.depth, "push record-stream frame");
        self.stack.push(Frame::TrailingEmit {
            bracket: ']',
            had_items: false,
            ptr,
        });
        self.stack.push(Frame::RecordStreamReader { stream, index: 0 });
        Ok(())
    }

    fn open_byte_stream(&mut self, stream: crate::value::ByteStream) -> Result<(), EncodeError> {
        let stream = stream.take()?;
        debug!("push byte-stream frame");
        self.stack.push(Frame::ByteStreamReader { stream });
        Ok(())
    }
}

impl Stream for Encoder {
    type Item = Result<Bytes, EncodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let hwm = this.options.high_water_mark;
        this.poll_pull(cx, hwm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Indent, Replacer};
    use crate::value::ToJson;
    use std::task::Waker;

    fn drain(mut encoder: Encoder) -> Result<String, EncodeError> {
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        let mut out = String::new();
        loop {
            match encoder.poll_pull(&mut cx, 0) {
                Poll::Ready(Some(Ok(chunk))) => {
                    out.push_str(std::str::from_utf8(&chunk).unwrap());
                }
                Poll::Ready(Some(Err(err))) => return Err(err),
                Poll::Ready(None) => return Ok(out),
                Poll::Pending => panic!("encoder stalled with nothing to await"),
            }
        }
    }

    #[test]
    fn encodes_flat_object_and_array() {
        let value = Value::object(vec![
            ("a".into(), Value::from(1.0)),
            (
                "b".into(),
                Value::array(vec![
                    Value::from(true),
                    Value::null(),
                    Value::from("x"),
                ]),
            ),
        ]);
        let out = drain(Encoder::new(value, None)).unwrap();
        assert_eq!(out, r#"{"a":1,"b":[true,null,"x"]}"#);
    }

    #[test]
    fn elides_undefined_object_values() {
        let value = Value::object(vec![
            ("a".into(), Value::undefined()),
            ("b".into(), Value::from(2.0)),
        ]);
        let out = drain(Encoder::new(value, None)).unwrap();
        assert_eq!(out, r#"{"b":2}"#);
    }

    #[test]
    fn non_finite_numbers_become_null_in_arrays() {
        let value = Value::array(vec![
            Value::from(1.0),
            Value::from(f64::NAN),
            Value::from(f64::INFINITY),
            Value::from(f64::NEG_INFINITY),
            Value::from(2.0),
        ]);
        let out = drain(Encoder::new(value, None)).unwrap();
        assert_eq!(out, "[1,null,null,null,2]");
    }

    #[test]
    fn pretty_print_matches_compact_once_whitespace_is_stripped() {
        let value = Value::array(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]);
        let options = EncodeOptions {
            indent: Some(Indent::spaces(2)),
            ..Default::default()
        };
        let pretty = drain(Encoder::new(value.clone(), Some(options))).unwrap();
        assert_eq!(pretty, "[\n  1,\n  2,\n  3\n]");
        let compact = drain(Encoder::new(value, None)).unwrap();
        let stripped: String = pretty.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(stripped, compact);
    }

    #[test]
    fn detects_self_referential_cycle() {
        let handle = match Value::object(vec![]) {
            Value::Object(handle) => handle,
            _ => unreachable!(),
        };
        handle
            .borrow_mut()
            .push(("self".to_string(), Value::Object(Rc::clone(&handle))));
        let root = Value::Object(handle);

        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        let mut encoder = Encoder::new(root, None);
        let mut out = String::new();
        let err = loop {
            match encoder.poll_pull(&mut cx, 0) {
                Poll::Ready(Some(Ok(chunk))) => {
                    out.push_str(std::str::from_utf8(&chunk).unwrap());
                }
                Poll::Ready(Some(Err(err))) => break err,
                Poll::Ready(None) => panic!("expected a circular structure error"),
                Poll::Pending => panic!("unexpected suspension"),
            }
        };
        assert!(matches!(err, EncodeError::CircularStructure { .. }));
        assert_eq!(out, r#"{"self":"#);
    }

    #[test]
    fn allow_list_replacer_filters_object_keys() {
        let value = Value::object(vec![
            ("a".into(), Value::from(1.0)),
            ("b".into(), Value::from(2.0)),
            ("c".into(), Value::from(3.0)),
        ]);
        let options = EncodeOptions {
            replacer: Some(Replacer::Keys(vec!["c".to_string(), "a".to_string()])),
            ..Default::default()
        };
        let out = drain(Encoder::new(value, Some(options))).unwrap();
        assert_eq!(out, r#"{"c":3,"a":1}"#);
    }

    struct Wrapped(f64);

    impl ToJson for Wrapped {
        fn to_json(&self, _key: &str) -> crate::error::Result<Value> {
            Ok(Value::from(self.0 * 2.0))
        }
    }

    #[test]
    fn custom_to_json_hook_is_applied() {
        let value = Value::Custom(Rc::new(Wrapped(21.0)));
        let out = drain(Encoder::new(value, None)).unwrap();
        assert_eq!(out, "42");
    }
}
