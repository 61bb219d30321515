//! Streaming JSON encoder (spec 4, the crate's core).

mod engine;
mod frame;
mod primitives;
mod replacer;

pub use engine::Encoder;

use std::task::{Context, Poll, Waker};

use crate::error::EncodeError;
use crate::options::EncodeOptions;
use crate::value::Value;

/// Drive an [`Encoder`] to completion synchronously, without a real
/// executor. There is nothing to block on in the common case: async
/// sub-sources that never resolve would spin here forever, which is
/// precisely what an executor-backed caller avoids by polling the
/// encoder (it implements [`asupersync::stream::Stream`]) from its own
/// event loop instead.
fn drive_to_string(mut encoder: Encoder) -> Result<String, EncodeError> {
    let waker = Waker::noop();
    let mut cx = Context::from_waker(waker);
    let mut out = String::new();
    loop {
        match encoder.poll_pull(&mut cx, 0) {
            Poll::Ready(Some(Ok(chunk))) => {
                out.push_str(std::str::from_utf8(&chunk).map_err(|_| {
                    EncodeError::unsupported_type("encoder produced non-UTF-8 output")
                })?);
            }
            Poll::Ready(Some(Err(err))) => return Err(err),
            Poll::Ready(None) => return Ok(out),
            Poll::Pending => continue,
        }
    }
}

/// Encode `value` to a complete JSON string. Fails if `value` contains a
/// cycle, an unsupported value, or an async sub-source that never
/// resolves to a value without also returning `Pending` forever (which
/// this function busy-polls past rather than suspending on).
pub fn encode_to_string(
    value: impl Into<Value>,
    options: Option<EncodeOptions>,
) -> Result<String, EncodeError> {
    drive_to_string(Encoder::new(value, options))
}

/// Encode `value` to a complete byte buffer.
pub fn encode_to_vec(
    value: impl Into<Value>,
    options: Option<EncodeOptions>,
) -> Result<Vec<u8>, EncodeError> {
    encode_to_string(value, options).map(String::into_bytes)
}

