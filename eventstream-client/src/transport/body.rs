//! Request body types for the outbound half of an event stream.
//!
//! [`request_body`] returns a connected pair: a [`BodyWriter`] that the
//! event writer task drives as its sink, and a [`TransportBody`] handed to
//! the HTTP client as the streamed request body.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Sink, Stream, StreamExt, ready};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::error::StreamError;

pin_project! {
    /// Streamed request body carrying signed event-stream envelopes.
    ///
    /// Usually created by [`request_body`]; any byte stream can back it.
    pub struct TransportBody {
        #[pin]
        stream: Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>,
        ended: bool,
    }
}

impl TransportBody {
    /// Create a streaming body from the given stream.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            ended: false,
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if *this.ended {
            return Poll::Ready(None);
        }
        match ready!(this.stream.poll_next(cx)) {
            Some(chunk) => Poll::Ready(Some(chunk.map(Frame::data))),
            None => {
                *this.ended = true;
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.ended
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody")
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

/// Write half of a streamed request body.
///
/// Closing the writer ends the body once buffered chunks are consumed.
/// Writes fail with [`StreamError::TransportClosed`] after the body is
/// dropped by the HTTP client.
#[derive(Debug, Clone)]
pub struct BodyWriter {
    tx: mpsc::Sender<Bytes>,
}

/// Create a connected body writer and streaming request body.
///
/// `capacity` bounds the chunks buffered between the two.
pub fn request_body(capacity: usize) -> (BodyWriter, TransportBody) {
    let (tx, rx) = mpsc::channel(capacity);
    (BodyWriter { tx }, TransportBody::streaming(rx.map(Ok)))
}

fn send_error(err: mpsc::SendError) -> StreamError {
    if err.is_disconnected() {
        StreamError::TransportClosed
    } else {
        StreamError::Transport(err.to_string())
    }
}

impl Sink<Bytes> for BodyWriter {
    type Error = StreamError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.tx.poll_ready(cx).map_err(send_error)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), StreamError> {
        self.tx.start_send(item).map_err(send_error)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.tx).poll_flush(cx).map_err(send_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.tx).poll_close(cx).map_err(send_error)
    }
}
