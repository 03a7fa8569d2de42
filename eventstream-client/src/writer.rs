//! Outbound half of an event stream.
//!
//! [`EventWriter`] hands events to a single background task that
//! serializes, signs and writes them in acceptance order. Because only that
//! task touches the signer and the connection, frames are never interleaved
//! and the signature chain is never shared.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use eventstream_core::{Frame, handshake_tags, header_names, message_types};
use futures::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot};

use crate::codec::EventSerializer;
use crate::config::{StreamOptions, StreamRole};
use crate::error::StreamError;
use crate::event::Event;
use crate::logging::{Direction, log_frame};
use crate::signer::{EventSigner, StreamSigner};
use crate::sync::StreamState;

/// An accepted event and the channel its write result is reported on.
struct PendingWrite<E, H> {
    event: Event<E, H>,
    result: oneshot::Sender<Result<(), StreamError>>,
}

/// Writes events to the outbound half of an event stream.
///
/// `send` may be called concurrently from many tasks; events are written in
/// the order the hand-off accepts them.
///
/// # Example
///
/// ```ignore
/// let writer = EventWriter::spawn(body_writer, MySerializer, signer, &options);
/// writer.send(MyEvent::Start).await?;
/// writer.close().await?;
/// ```
pub struct EventWriter<E, H = ()> {
    queue: mpsc::Sender<PendingWrite<E, H>>,
    state: Arc<StreamState>,
    role: StreamRole,
    /// Handshake tag this endpoint may send, when the handshake is enabled.
    handshake: Option<&'static str>,
}

impl<E, H> EventWriter<E, H>
where
    E: Send + 'static,
    H: Send + 'static,
{
    /// Start the writer task over `sink`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<S, W, G>(
        sink: W,
        serializer: S,
        signer: StreamSigner<G>,
        options: &StreamOptions,
    ) -> Self
    where
        S: EventSerializer<Event = E, Handshake = H>,
        W: Sink<Bytes, Error = StreamError> + Unpin + Send + 'static,
        G: EventSigner,
    {
        let (queue, rx) = mpsc::channel(options.send_buffer);
        let state = Arc::new(StreamState::new());

        let task = WriterTask {
            queue: rx,
            sink: Some(sink),
            serializer,
            signer,
            state: state.clone(),
            log_writes: options.log_writes,
        };
        tokio::spawn(task.run());

        Self {
            queue,
            state,
            role: options.role,
            handshake: options
                .initial_handshake
                .then(|| options.role.outbound_handshake_tag()),
        }
    }

    /// Send one event and wait for it to be written.
    ///
    /// Fails with [`StreamError::TransportClosed`] if closing begins before
    /// the writer task accepts the event. Once accepted, the result is that
    /// of the write itself, even when the writer is closed meanwhile.
    pub async fn send(&self, event: E) -> Result<(), StreamError> {
        self.send_event_with_cancel(Event::Data(event), std::future::pending::<()>())
            .await
    }

    /// Like [`send`](Self::send), giving up with [`StreamError::Cancelled`]
    /// once `cancel` resolves.
    ///
    /// An event already handed to the writer task is not retracted.
    pub async fn send_with_cancel<F>(&self, event: E, cancel: F) -> Result<(), StreamError>
    where
        F: Future,
    {
        self.send_event_with_cancel(Event::Data(event), cancel).await
    }

    /// Send this endpoint's initial handshake message.
    pub async fn send_handshake(&self, value: H) -> Result<(), StreamError> {
        let event = match self.role {
            StreamRole::Client => Event::InitialRequest(value),
            StreamRole::Server => Event::InitialResponse(value),
        };
        self.send_event(event).await
    }

    /// Send any member of the event union.
    ///
    /// Exceptions and generic errors are written as `exception` and `error`
    /// frames; unknown events are written verbatim. Handshake members are
    /// rejected unless the handshake is enabled and the member is the one
    /// this endpoint's role sends.
    pub async fn send_event(&self, event: Event<E, H>) -> Result<(), StreamError> {
        self.send_event_with_cancel(event, std::future::pending::<()>())
            .await
    }

    pub async fn send_event_with_cancel<F>(
        &self,
        event: Event<E, H>,
        cancel: F,
    ) -> Result<(), StreamError>
    where
        F: Future,
    {
        if let Some(tag) = event.handshake_tag() {
            self.check_handshake(tag)?;
        }
        if let Some(err) = self.state.err.get() {
            return Err(err);
        }
        if self.state.done.is_fired() {
            return Err(StreamError::TransportClosed);
        }

        let (result_tx, mut result_rx) = oneshot::channel();
        let pending = PendingWrite {
            event,
            result: result_tx,
        };
        tokio::pin!(cancel);

        tokio::select! {
            biased;
            _ = self.state.done.fired() => return Err(StreamError::TransportClosed),
            _ = &mut cancel => return Err(StreamError::Cancelled),
            sent = self.queue.send(pending) => {
                sent.map_err(|_| StreamError::TransportClosed)?;
            }
        }

        // Once accepted, the writer task either writes the event and reports
        // the outcome, or drops it unwritten along with `result_rx`'s sender.
        tokio::select! {
            biased;
            result = &mut result_rx => result.unwrap_or(Err(StreamError::TransportClosed)),
            _ = &mut cancel => Err(StreamError::Cancelled),
        }
    }

    fn check_handshake(&self, tag: &'static str) -> Result<(), StreamError> {
        match self.handshake {
            None => Err(StreamError::Protocol(
                "initial handshake is not enabled for this stream".into(),
            )),
            Some(expected) if expected != tag => Err(StreamError::Protocol(format!(
                "{tag} is not sent by the {:?} role",
                self.role
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Close the writer.
    ///
    /// Writes the signed empty end-of-stream frame, closes the connection
    /// and returns the recorded error, if any. Safe to call concurrently
    /// and repeatedly; only the first call has an effect on the wire.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.state.done.fire();
        self.state.finished.fired().await;
        self.state.err.result()
    }

    /// The recorded terminal error, if any.
    pub fn err(&self) -> Option<StreamError> {
        self.state.err.get()
    }

    /// Resolves once a terminal error has been recorded.
    pub async fn error_set(&self) {
        self.state.err.wait().await
    }

    /// Whether closing has begun.
    pub fn is_closed(&self) -> bool {
        self.state.done.is_fired()
    }

    pub(crate) fn state(&self) -> Arc<StreamState> {
        self.state.clone()
    }
}

impl<E, H> std::fmt::Debug for EventWriter<E, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("closed", &self.state.done.is_fired())
            .field("err", &self.state.err.get())
            .finish()
    }
}

struct WriterTask<S: EventSerializer, W, G> {
    queue: mpsc::Receiver<PendingWrite<S::Event, S::Handshake>>,
    sink: Option<W>,
    serializer: S,
    signer: StreamSigner<G>,
    state: Arc<StreamState>,
    log_writes: bool,
}

impl<S, W, G> WriterTask<S, W, G>
where
    S: EventSerializer,
    W: Sink<Bytes, Error = StreamError> + Unpin + Send + 'static,
    G: EventSigner,
{
    async fn run(mut self) {
        let state = self.state.clone();

        loop {
            let pending = tokio::select! {
                biased;
                _ = state.done.fired() => break,
                pending = self.queue.recv() => match pending {
                    Some(pending) => pending,
                    // every EventWriter handle is gone
                    None => break,
                },
            };
            if self.write_pending(pending).await.is_err() {
                self.abort().await;
                return;
            }
        }

        // Refuse new hand-offs but write everything already accepted.
        self.queue.close();
        while let Ok(pending) = self.queue.try_recv() {
            if self.write_pending(pending).await.is_err() {
                self.abort().await;
                return;
            }
        }

        if let Err(err) = self.close_stream().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %err, "failed to close event stream writer");
            self.state.err.set(err);
        }
        self.finish();
    }

    async fn write_pending(
        &mut self,
        pending: PendingWrite<S::Event, S::Handshake>,
    ) -> Result<(), StreamError> {
        let PendingWrite { event, result: reply } = pending;
        let result = self.write_event(event).await;
        if let Err(err) = &result {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %err, "event stream writer failed");
            self.state.err.set(err.clone());
        }
        // Report before firing done so the sender sees the real outcome.
        let _ = reply.send(result.clone());
        if result.is_err() {
            self.state.done.fire();
        }
        result
    }

    async fn write_event(
        &mut self,
        event: Event<S::Event, S::Handshake>,
    ) -> Result<(), StreamError> {
        let frame = self.encode_event(&event)?;
        drop(event);
        if self.log_writes {
            log_frame(Direction::Outbound, &frame);
        }
        let inner = frame.encode()?;
        let signed = self.signer.sign_event(&inner)?;
        self.write_bytes(signed).await
    }

    fn encode_event(&self, event: &Event<S::Event, S::Handshake>) -> Result<Frame, StreamError> {
        let frame = match event {
            Event::Data(event) => {
                let mut frame =
                    Frame::default().with_header(header_names::MESSAGE_TYPE, message_types::EVENT);
                self.serializer.serialize_event(event, &mut frame)?;
                if !frame.headers().contains(header_names::EVENT_TYPE) {
                    return Err(StreamError::Serialization(
                        "serializer did not set the :event-type header".into(),
                    ));
                }
                frame
            }
            Event::InitialRequest(value) => {
                self.encode_handshake(handshake_tags::INITIAL_REQUEST, value)?
            }
            Event::InitialResponse(value) => {
                self.encode_handshake(handshake_tags::INITIAL_RESPONSE, value)?
            }
            Event::Exception(exception) => exception.to_frame(),
            Event::GenericError(error) => error.to_frame(),
            Event::Unknown(unknown) => unknown.frame().clone(),
        };
        Ok(frame)
    }

    fn encode_handshake(&self, tag: &'static str, value: &S::Handshake) -> Result<Frame, StreamError> {
        let mut frame =
            Frame::default().with_header(header_names::MESSAGE_TYPE, message_types::EVENT);
        self.serializer.serialize_handshake(value, &mut frame)?;
        frame.headers_mut().set(header_names::EVENT_TYPE, tag);
        Ok(frame)
    }

    async fn write_bytes(&mut self, bytes: Bytes) -> Result<(), StreamError> {
        match self.sink.as_mut() {
            Some(sink) => sink.send(bytes).await,
            None => Err(StreamError::TransportClosed),
        }
    }

    /// Write the signed empty end-of-stream frame, then close the
    /// connection. Returns the first error.
    async fn close_stream(&mut self) -> Result<(), StreamError> {
        let marker = match self.signer.sign_event(&[]) {
            Ok(marker) => self.write_bytes(marker).await,
            Err(err) => Err(err),
        };
        let closed = self.release().await;
        marker.and(closed)
    }

    async fn release(&mut self) -> Result<(), StreamError> {
        match self.sink.take() {
            Some(mut sink) => sink.close().await,
            None => Ok(()),
        }
    }

    /// Tear down after a fatal error, without the end-of-stream marker.
    async fn abort(mut self) {
        self.state.done.fire();
        self.queue.close();
        let _ = self.release().await;
        self.finish();
    }

    fn finish(self) {
        let state = self.state.clone();
        drop(self);
        state.done.fire();
        state.finished.fire();
    }
}
