//! Inbound half of an event stream.
//!
//! [`EventReader`] runs one background task that decodes frames from the
//! connection, classifies them and routes them:
//!
//! - data events and unknown messages go to the main feed
//! - the handshake message goes to a one-slot channel
//! - exceptions and generic errors become the terminal error
//!
//! The feed closes exactly once, when the task ends. Check
//! [`err`](EventReader::err) afterwards to tell a clean end of stream from a
//! failure.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use eventstream_core::{
    Frame, FrameBuffer, MessageKind, classify, handshake_tags, header_names,
};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::codec::EventDeserializer;
use crate::config::StreamOptions;
use crate::error::{GenericApiError, StreamError};
use crate::event::{Event, Received, UnknownEvent};
use crate::logging::{Direction, log_frame};
use crate::sync::StreamState;

/// Reads events from the inbound half of an event stream.
///
/// Dropping the reader closes it.
pub struct EventReader<E, H = ()> {
    events: mpsc::Receiver<Received<E>>,
    initial: Option<oneshot::Receiver<H>>,
    initial_handshake: bool,
    state: Arc<StreamState>,
}

impl<E, H> EventReader<E, H>
where
    E: Send + 'static,
    H: Send + 'static,
{
    /// Start the reader task over `source`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<D, R>(source: R, deserializer: D, options: &StreamOptions) -> Self
    where
        D: EventDeserializer<Event = E, Handshake = H>,
        R: Stream<Item = Result<Bytes, StreamError>> + Unpin + Send + 'static,
    {
        let (events_tx, events) = mpsc::channel(options.feed_buffer);
        let (initial_tx, initial_rx) = oneshot::channel();
        let state = Arc::new(StreamState::new());

        let task = ReaderTask {
            source,
            buffer: FrameBuffer::new(),
            deserializer,
            events: events_tx,
            initial: Some(initial_tx),
            handshake: options
                .initial_handshake
                .then(|| options.role.inbound_handshake_tag()),
            log_reads: options.log_reads,
            state: state.clone(),
        };
        tokio::spawn(task.run());

        Self {
            events,
            initial: Some(initial_rx),
            initial_handshake: options.initial_handshake,
            state,
        }
    }

    /// Receive the next item from the main feed.
    ///
    /// Returns `None` once the stream has terminated.
    pub async fn recv(&mut self) -> Option<Received<E>> {
        self.events.recv().await
    }

    /// The main feed.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Received<E>> {
        &mut self.events
    }

    /// Wait for the peer's initial handshake message.
    ///
    /// Fails if the handshake is disabled, was already taken, or the stream
    /// ended before it arrived.
    pub async fn initial_response(&mut self) -> Result<H, StreamError> {
        if !self.initial_handshake {
            return Err(StreamError::Protocol(
                "initial handshake is not enabled for this stream".into(),
            ));
        }
        let rx = self.initial.take().ok_or_else(|| {
            StreamError::Protocol("initial handshake message was already taken".into())
        })?;
        match rx.await {
            Ok(value) => Ok(value),
            Err(_) => Err(self.state.err.get().unwrap_or_else(|| {
                StreamError::Protocol("stream ended before the initial handshake message".into())
            })),
        }
    }

    /// Close the reader and return the recorded error, if any.
    ///
    /// Does not wait for the reader task; the connection is released once
    /// the task observes the close.
    pub fn close(&self) -> Result<(), StreamError> {
        self.state.done.fire();
        self.state.err.result()
    }

    /// Resolves once the reader task has ended and the feed is closed.
    pub async fn closed(&self) {
        self.state.finished.fired().await
    }

    pub fn is_closed(&self) -> bool {
        self.state.done.is_fired()
    }

    /// The recorded terminal error, if any.
    pub fn err(&self) -> Option<StreamError> {
        self.state.err.get()
    }

    /// Resolves once a terminal error has been recorded.
    pub async fn error_set(&self) {
        self.state.err.wait().await
    }

    pub(crate) fn state(&self) -> Arc<StreamState> {
        self.state.clone()
    }
}

impl<E, H> Drop for EventReader<E, H> {
    fn drop(&mut self) {
        self.state.done.fire();
    }
}

impl<E, H> Stream for EventReader<E, H> {
    type Item = Received<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl<E, H> std::fmt::Debug for EventReader<E, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReader")
            .field("closed", &self.state.done.is_fired())
            .field("err", &self.state.err.get())
            .finish()
    }
}

enum Flow {
    Continue,
    Stop,
}

struct ReaderTask<D: EventDeserializer, R> {
    source: R,
    buffer: FrameBuffer,
    deserializer: D,
    events: mpsc::Sender<Received<D::Event>>,
    initial: Option<oneshot::Sender<D::Handshake>>,
    /// Inbound handshake tag routed to `initial`.
    handshake: Option<&'static str>,
    log_reads: bool,
    state: Arc<StreamState>,
}

impl<D, R> ReaderTask<D, R>
where
    D: EventDeserializer,
    R: Stream<Item = Result<Bytes, StreamError>> + Unpin + Send + 'static,
{
    async fn run(mut self) {
        let state = self.state.clone();

        loop {
            let next = tokio::select! {
                biased;
                _ = state.done.fired() => break,
                next = self.next_frame() => next,
            };
            let flow = match next {
                Ok(Some(frame)) => self.dispatch(frame).await,
                Ok(None) => Ok(Flow::Stop),
                Err(err) => Err(err),
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }

        // Closes the feed, the handshake slot and the connection.
        drop(self);
        state.done.fire();
        state.finished.fire();
    }

    /// Record a terminal error unless a local close already began.
    fn fail(&self, err: StreamError) {
        if self.state.done.is_fired() {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %err, "ignoring event stream error after close");
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %err, "event stream reader terminated");
        self.state.err.set(err);
    }

    /// Next frame from the connection; `None` at a clean end of input.
    async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        loop {
            if let Some(frame) = self.buffer.try_next()? {
                return Ok(Some(frame));
            }
            match self.source.next().await {
                Some(Ok(chunk)) => self.buffer.extend(&chunk),
                Some(Err(err)) => return Err(err),
                None => {
                    self.buffer.finish()?;
                    return Ok(None);
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Flow, StreamError> {
        let Some(frame) = unwrap_envelope(frame)? else {
            return Ok(Flow::Stop);
        };
        if self.log_reads {
            log_frame(Direction::Inbound, &frame);
        }

        match self.decode(frame)? {
            Event::Data(event) => Ok(self.deliver(Received::Event(event)).await),
            Event::Unknown(unknown) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(tag = unknown.tag(), "received unknown event stream message");
                Ok(self.deliver(Received::Unknown(unknown)).await)
            }
            Event::InitialRequest(value) | Event::InitialResponse(value) => {
                match self.initial.take() {
                    Some(tx) => {
                        let _ = tx.send(value);
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("ignoring repeated initial handshake message");
                    }
                }
                Ok(Flow::Continue)
            }
            Event::Exception(exception) => Err(StreamError::Service(exception)),
            Event::GenericError(error) => Err(StreamError::GenericApi(error)),
        }
    }

    fn decode(&self, frame: Frame) -> Result<Event<D::Event, D::Handshake>, StreamError> {
        let event = match classify(frame.headers())? {
            MessageKind::Data { event_type } => self.decode_data(&event_type, frame)?,
            MessageKind::InitialRequest => {
                self.decode_handshake(handshake_tags::INITIAL_REQUEST, frame)?
            }
            MessageKind::InitialResponse => {
                self.decode_handshake(handshake_tags::INITIAL_RESPONSE, frame)?
            }
            MessageKind::Exception { exception_type } => Event::Exception(
                self.deserializer
                    .deserialize_exception(&exception_type, &frame)?,
            ),
            MessageKind::Error => Event::GenericError(GenericApiError::from_frame(&frame)),
            MessageKind::Unknown { tag } => Event::Unknown(UnknownEvent::new(tag, frame)),
        };
        Ok(event)
    }

    /// Route a handshake tag to the handshake slot when it is the one this
    /// endpoint expects, otherwise through the data path.
    fn decode_handshake(
        &self,
        tag: &'static str,
        frame: Frame,
    ) -> Result<Event<D::Event, D::Handshake>, StreamError> {
        if self.handshake != Some(tag) {
            return self.decode_data(tag, frame);
        }
        let value = self.deserializer.deserialize_handshake(&frame)?;
        Ok(if tag == handshake_tags::INITIAL_REQUEST {
            Event::InitialRequest(value)
        } else {
            Event::InitialResponse(value)
        })
    }

    fn decode_data(
        &self,
        event_type: &str,
        frame: Frame,
    ) -> Result<Event<D::Event, D::Handshake>, StreamError> {
        Ok(match self.deserializer.deserialize_event(event_type, &frame)? {
            Some(event) => Event::Data(event),
            None => Event::Unknown(UnknownEvent::new(event_type, frame)),
        })
    }

    async fn deliver(&mut self, item: Received<D::Event>) -> Flow {
        tokio::select! {
            biased;
            _ = self.state.done.fired() => Flow::Stop,
            sent = self.events.send(item) => match sent {
                Ok(()) => Flow::Continue,
                Err(_) => Flow::Stop,
            },
        }
    }
}

/// Unwrap a signed envelope.
///
/// Frames without `:chunk-signature` (or carrying their own
/// `:message-type`) pass through. An empty signed payload is the
/// end-of-stream marker and yields `None`.
fn unwrap_envelope(frame: Frame) -> Result<Option<Frame>, StreamError> {
    let headers = frame.headers();
    if !headers.contains(header_names::CHUNK_SIGNATURE)
        || headers.contains(header_names::MESSAGE_TYPE)
    {
        return Ok(Some(frame));
    }
    if frame.payload().is_empty() {
        return Ok(None);
    }
    Ok(Some(Frame::decode(frame.payload())?))
}
