//! Lazy event stream over a response body

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use super::decoder::{DecoderStats, Frame, FrameDecoder};
use super::events::ProtocolEvent;
use crate::backend::ByteStream;
use crate::error::ClientError;

/// Protocol events decoded from one chat response
///
/// Yields events in arrival order, then ends at `[DONE]`, at end of body, or
/// after a single transport error. Not restartable. The response body is
/// dropped as soon as the stream ends, and dropping the `EventStream` early
/// releases it too.
pub struct EventStream {
    /// Response body; `None` once released
    body: Option<ByteStream>,
    decoder: FrameDecoder,
    /// Events decoded from the last delivery but not yet yielded
    pending: VecDeque<ProtocolEvent>,
}

impl EventStream {
    /// Wrap a response body
    #[must_use]
    pub fn new(body: ByteStream) -> Self {
        Self {
            body: Some(body),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Decoder counters so far
    #[must_use]
    pub fn stats(&self) -> &DecoderStats {
        self.decoder.stats()
    }

    /// Whether the underlying body has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }

    fn enqueue(&mut self, frames: impl IntoIterator<Item = Frame>) {
        for frame in frames {
            if let Frame::Event(event) = frame {
                self.pending.push_back(event);
            }
        }
    }

    fn release(&mut self) {
        if self.body.take().is_some() {
            tracing::trace!(
                events = self.decoder.stats().events_decoded,
                saw_done = self.decoder.stats().saw_done,
                "Released response body"
            );
        }
    }
}

impl Stream for EventStream {
    type Item = Result<ProtocolEvent, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let Some(body) = this.body.as_mut() else {
                return Poll::Ready(None);
            };

            match body.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    let frames = this.decoder.feed(&chunk);
                    this.enqueue(frames);
                    if this.decoder.is_finished() {
                        this.release();
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.release();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    let tail = this.decoder.finish();
                    this.enqueue(tail);
                    this.release();
                }
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if self.body.is_some() {
            tracing::debug!(
                events = self.decoder.stats().events_decoded,
                "Event stream dropped before end of response; releasing connection"
            );
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("released", &self.body.is_none())
            .field("pending", &self.pending.len())
            .field("stats", self.decoder.stats())
            .finish()
    }
}
