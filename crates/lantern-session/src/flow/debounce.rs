//! Timer-gated coalescing of stream values.
//!
//! [`Debouncer`] keeps the latest value and a deadline; every new value
//! replaces the pending one and pushes the deadline out. A value is released
//! only once the deadline passes with nothing newer arriving.
//!
//! Time comes from `tokio::time`, so paused-clock tests drive it exactly.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;

/// Latest-value buffer with a quiet-period deadline
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    /// Create an empty buffer
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Offer a new value at `now`, restarting the quiet period
    pub fn offer(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + self.window);
    }

    /// Deadline of the pending value
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Release the pending value if its quiet period elapsed
    pub fn poll_expired(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.take(),
            _ => None,
        }
    }

    /// Release the pending value unconditionally
    pub fn take(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }
}

struct DebounceState<T> {
    upstream: BoxStream<'static, T>,
    buffer: Debouncer<T>,
    upstream_done: bool,
}

/// Debounce a stream. When the upstream ends, a pending value is flushed
/// before the debounced stream ends.
pub fn debounce<S>(upstream: S, window: Duration) -> BoxStream<'static, S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let state = DebounceState {
        upstream: upstream.boxed(),
        buffer: Debouncer::new(window),
        upstream_done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.upstream_done {
                return st.buffer.take().map(|value| (value, st));
            }
            match st.buffer.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        next = st.upstream.next() => match next {
                            Some(value) => st.buffer.offer(value, Instant::now()),
                            None => st.upstream_done = true,
                        },
                        _ = tokio::time::sleep_until(deadline) => {
                            if let Some(value) = st.buffer.poll_expired(Instant::now()) {
                                return Some((value, st));
                            }
                        }
                    }
                }
                None => match st.upstream.next().await {
                    Some(value) => st.buffer.offer(value, Instant::now()),
                    None => return None,
                },
            }
        }
    })
    .boxed()
}
