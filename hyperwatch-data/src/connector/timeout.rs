//! Timeout wrapper for WebSocket streams.
//!
//! Provides a stream wrapper that monitors idle time and ends the stream if no data is
//! received for a configurable period. This is how silent disconnections, which never
//! produce an explicit error or close frame, are detected.

use futures::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// A stream wrapper that terminates the inner stream if no data is received for the
/// configured timeout period. The connector treats the resulting end of stream as an
/// abnormal closure and enters its reconnect policy.
#[derive(Debug)]
pub struct TimeoutStream<S> {
    inner: S,
    timeout_duration: Duration,
    deadline: Pin<Box<tokio::time::Sleep>>,
    timed_out: bool,
}

impl<S> TimeoutStream<S> {
    /// Create a new timeout stream wrapper with the specified timeout duration.
    pub fn new(inner: S, timeout_duration: Duration) -> Self {
        Self {
            inner,
            timeout_duration,
            deadline: Box::pin(tokio::time::sleep(timeout_duration)),
            timed_out: false,
        }
    }

    /// Whether the stream ended because the idle deadline elapsed.
    pub fn has_timed_out(&self) -> bool {
        self.timed_out
    }
}

impl<S> Stream for TimeoutStream<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.timed_out {
            return Poll::Ready(None);
        }

        let timeout_duration = self.timeout_duration;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                // Any frame, including pong, counts as liveness
                self.deadline.as_mut().reset(Instant::now() + timeout_duration);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match self.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    tracing::warn!(
                        timeout_secs = timeout_duration.as_secs(),
                        "WebSocket read timeout - no data received, triggering reconnection"
                    );
                    self.timed_out = true;
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
