//! Shared helpers for the integration test binaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Wake, Waker};

use fluxjson::{EncodeError, Encoder};

/// Drive an [`Encoder`] to completion with a no-op waker, collecting every
/// chunk into a single string. Panics if the encoder ever suspends — use
/// [`counting_waker`] instead for tests that exercise async sub-sources.
pub fn drain(mut encoder: Encoder) -> Result<String, EncodeError> {
    let waker = Waker::noop();
    let mut cx = Context::from_waker(waker);
    let mut out = String::new();
    loop {
        match encoder.poll_pull(&mut cx, 0) {
            Poll::Ready(Some(Ok(chunk))) => {
                out.push_str(std::str::from_utf8(&chunk).expect("encoder output must be UTF-8"));
            }
            Poll::Ready(Some(Err(err))) => return Err(err),
            Poll::Ready(None) => return Ok(out),
            Poll::Pending => panic!("encoder stalled with nothing scheduled to wake it"),
        }
    }
}

/// Drive an [`Encoder`] with `max_len`-sized pulls, returning the produced
/// chunks as a `Vec<String>` rather than one concatenated string — used to
/// check that output is invariant to how a consumer chooses its pull size.
pub fn drain_chunks(mut encoder: Encoder, max_len: usize) -> Result<Vec<String>, EncodeError> {
    let waker = Waker::noop();
    let mut cx = Context::from_waker(waker);
    let mut chunks = Vec::new();
    loop {
        match encoder.poll_pull(&mut cx, max_len) {
            Poll::Ready(Some(Ok(chunk))) => {
                chunks.push(std::str::from_utf8(&chunk).expect("encoder output must be UTF-8").to_string());
            }
            Poll::Ready(Some(Err(err))) => return Err(err),
            Poll::Ready(None) => return Ok(chunks),
            Poll::Pending => panic!("encoder stalled with nothing scheduled to wake it"),
        }
    }
}

pub struct CountingWaker(pub AtomicUsize);

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A real waker that records how many times it has been woken, so a test
/// can assert that suspension on an async sub-source actually requests a
/// wake-up rather than relying on a caller that just busy-polls forever.
pub fn counting_waker() -> (Waker, Arc<CountingWaker>) {
    let inner = Arc::new(CountingWaker(AtomicUsize::new(0)));
    (Waker::from(Arc::clone(&inner)), inner)
}
