//! Redraw coalescing for event streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::events::EngineEvent;

/// Extension trait to coalesce redraw requests on any event stream
pub trait CoalesceRedrawsExt: Stream<Item = EngineEvent> {
    /// Emit at most one `Redraw` per interval.
    ///
    /// Uses "latest-wins" semantics for redraws: if several arrive during an
    /// interval, only the newest is emitted. Every other event passes through
    /// immediately, in order.
    fn coalesce_redraws(self, period: Duration) -> CoalesceRedraws<Self>
    where
        Self: Sized,
    {
        CoalesceRedraws::new(self, period)
    }
}

impl<T: Stream<Item = EngineEvent>> CoalesceRedrawsExt for T {}

pin_project! {
    /// A stream combinator that rate-limits redraw events
    pub struct CoalesceRedraws<S> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<EngineEvent>,
        done: bool,
    }
}

impl<S: Stream<Item = EngineEvent>> CoalesceRedraws<S> {
    /// Create a coalescing stream. Must be called within a tokio runtime.
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, pending: None, done: false }
    }
}

impl<S: Stream<Item = EngineEvent>> Stream for CoalesceRedraws<S> {
    type Item = EngineEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain what is ready; other events go out at once, redraws are held
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) if event.is_redraw() => {
                    *this.pending = Some(event);
                }
                Poll::Ready(Some(event)) => return Poll::Ready(Some(event)),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if *this.done {
            // flush the last redraw without waiting for the window
            return Poll::Ready(this.pending.take());
        }
        if this.pending.is_none() {
            return Poll::Pending;
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.pending.take())
    }
}
