//! A writer and a reader paired over one connection.

use std::future::Future;
use std::sync::Arc;

use crate::error::StreamError;
use crate::event::Received;
use crate::reader::EventReader;
use crate::sync::StreamState;
use crate::writer::EventWriter;

/// A bidirectional event stream.
///
/// `In` is the inbound event union (read), `Out` the outbound one
/// (written). `InH` and `OutH` are the handshake payloads. Either half may
/// be absent for input-only or output-only operations.
///
/// The first failure on either half is recorded on the pair and closes
/// both halves: a service exception from the peer stops the writer, and a
/// fatal write error stops the reader.
pub struct EventStream<In, Out, InH = (), OutH = ()> {
    writer: Option<EventWriter<Out, OutH>>,
    reader: Option<EventReader<In, InH>>,
    state: Arc<StreamState>,
}

impl<In, Out, InH, OutH> EventStream<In, Out, InH, OutH>
where
    In: Send + 'static,
    Out: Send + 'static,
    InH: Send + 'static,
    OutH: Send + 'static,
{
    /// Pair the halves and start watching them for failures.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(writer: Option<EventWriter<Out, OutH>>, reader: Option<EventReader<In, InH>>) -> Self {
        let state = Arc::new(StreamState::new());
        tokio::spawn(watch(
            state.clone(),
            writer.as_ref().map(EventWriter::state),
            reader.as_ref().map(EventReader::state),
        ));
        Self {
            writer,
            reader,
            state,
        }
    }

    pub fn writer(&self) -> Option<&EventWriter<Out, OutH>> {
        self.writer.as_ref()
    }

    pub fn reader(&self) -> Option<&EventReader<In, InH>> {
        self.reader.as_ref()
    }

    pub fn reader_mut(&mut self) -> Option<&mut EventReader<In, InH>> {
        self.reader.as_mut()
    }

    fn writer_half(&self) -> Result<&EventWriter<Out, OutH>, StreamError> {
        self.writer
            .as_ref()
            .ok_or_else(|| StreamError::Protocol("event stream has no output half".into()))
    }

    fn reader_half(&mut self) -> Result<&mut EventReader<In, InH>, StreamError> {
        self.reader
            .as_mut()
            .ok_or_else(|| StreamError::Protocol("event stream has no input half".into()))
    }

    /// Send one event on the output half.
    pub async fn send(&self, event: Out) -> Result<(), StreamError> {
        self.writer_half()?.send(event).await
    }

    pub async fn send_with_cancel<F>(&self, event: Out, cancel: F) -> Result<(), StreamError>
    where
        F: Future,
    {
        self.writer_half()?.send_with_cancel(event, cancel).await
    }

    /// Receive the next item from the input half.
    ///
    /// Returns `None` when the input half has terminated or is absent.
    pub async fn recv(&mut self) -> Option<Received<In>> {
        match self.reader.as_mut() {
            Some(reader) => reader.recv().await,
            None => None,
        }
    }

    /// Send this endpoint's initial handshake message and wait for the
    /// peer's.
    pub async fn handshake(&mut self, value: OutH) -> Result<InH, StreamError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| StreamError::Protocol("event stream has no output half".into()))?;
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StreamError::Protocol("event stream has no input half".into()))?;

        let (sent, received) = tokio::join!(writer.send_handshake(value), reader.initial_response());
        sent?;
        received
    }

    /// Wait for the peer's initial handshake message.
    pub async fn initial_response(&mut self) -> Result<InH, StreamError> {
        self.reader_half()?.initial_response().await
    }

    /// Close both halves and return the stream's error, if any.
    ///
    /// Idempotent. The writer finishes its queued events and end-of-stream
    /// frame before this returns.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.state.done.fire();
        if let Some(writer) = &self.writer {
            let _ = writer.close().await;
        }
        if let Some(reader) = &self.reader {
            let _ = reader.close();
            reader.closed().await;
        }
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The stream's error: the pair's recorded failure, then the writer's,
    /// then the reader's.
    pub fn err(&self) -> Option<StreamError> {
        self.state
            .err
            .get()
            .or_else(|| self.writer.as_ref().and_then(EventWriter::err))
            .or_else(|| self.reader.as_ref().and_then(EventReader::err))
    }

    pub fn is_closed(&self) -> bool {
        self.state.done.is_fired()
    }
}

impl<In, Out, InH, OutH> Drop for EventStream<In, Out, InH, OutH> {
    fn drop(&mut self) {
        self.state.done.fire();
    }
}

impl<In, Out, InH, OutH> std::fmt::Debug for EventStream<In, Out, InH, OutH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("has_writer", &self.writer.is_some())
            .field("has_reader", &self.reader.is_some())
            .field("closed", &self.state.done.is_fired())
            .field("err", &self.state.err.get())
            .finish()
    }
}

/// Resolves with a half's error once one is recorded; never for a missing
/// half.
async fn half_error(half: Option<&StreamState>) -> StreamError {
    match half {
        Some(state) => {
            state.err.wait().await;
            match state.err.get() {
                Some(err) => err,
                None => std::future::pending().await,
            }
        }
        None => std::future::pending().await,
    }
}

async fn watch(pair: Arc<StreamState>, writer: Option<Arc<StreamState>>, reader: Option<Arc<StreamState>>) {
    let err = tokio::select! {
        biased;
        _ = pair.done.fired() => return,
        err = half_error(writer.as_deref()) => err,
        err = half_error(reader.as_deref()) => err,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(error = %err, "closing event stream after failure");

    pair.err.set(err);
    for half in writer.iter().chain(reader.iter()) {
        half.done.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamOptions;
    use crate::test_support::{RecordingSink, TaskCodec, TaskEvent, inner_frames, raw_frame, signer};
    use bytes::Bytes;
    use eventstream_core::header_names;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    type TaskStream = EventStream<TaskEvent, TaskEvent, String, String>;

    fn event(event_type: &str) -> Bytes {
        raw_frame(&[(":message-type", "event"), (":event-type", event_type)], b"")
    }

    fn reader(chunks: Vec<Result<Bytes, StreamError>>, options: &StreamOptions) -> EventReader<TaskEvent, String> {
        EventReader::spawn(futures::stream::iter(chunks), TaskCodec, options)
    }

    async fn wait_closed(writer: &EventWriter<TaskEvent, String>) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !writer.is_closed() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("writer was not closed");
    }

    #[tokio::test]
    async fn test_exception_closes_writer() {
        let (sink, log) = RecordingSink::new();
        let writer = EventWriter::spawn(sink, TaskCodec, signer(), &StreamOptions::new());
        let exception = raw_frame(
            &[(":message-type", "exception"), (":exception-type", "LimitExceededException")],
            br#"{"Message":"too many streams"}"#,
        );
        let mut stream: TaskStream = EventStream::new(
            Some(writer),
            Some(reader(vec![Ok(event("Start")), Ok(exception)], &StreamOptions::new())),
        );

        assert_eq!(stream.recv().await, Some(Received::Event(TaskEvent::Start)));
        assert!(stream.recv().await.is_none());
        wait_closed(stream.writer().unwrap()).await;

        assert!(stream.send(TaskEvent::Done).await.unwrap_err().is_transport_closed());
        let err = stream.close().await.unwrap_err();
        assert!(err.is_terminal_service_error());

        // the writer still ends its half cleanly
        assert_eq!(log.frames().len(), 1);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_writer_failure_closes_reader() {
        let (sink, _log) = RecordingSink::new();
        let writer = EventWriter::spawn(sink, TaskCodec, signer(), &StreamOptions::new());
        let (_tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, StreamError>>();
        let reader = EventReader::spawn(rx, TaskCodec, &StreamOptions::new());
        let mut stream: TaskStream = EventStream::new(Some(writer), Some(reader));

        assert!(stream.send(TaskEvent::Poison).await.is_err());
        let next = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("reader was not closed");
        assert!(next.is_none());
        assert!(matches!(stream.err(), Some(StreamError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_clean_close() {
        let (sink, log) = RecordingSink::new();
        let writer = EventWriter::spawn(sink, TaskCodec, signer(), &StreamOptions::new());
        let (_tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, StreamError>>();
        let reader = EventReader::spawn(rx, TaskCodec, &StreamOptions::new());
        let stream: TaskStream = EventStream::new(Some(writer), Some(reader));

        stream.send(TaskEvent::Start).await.unwrap();
        stream.close().await.unwrap();
        stream.close().await.unwrap();

        assert!(stream.is_closed());
        assert_eq!(log.frames().len(), 2);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handshake() {
        let (sink, log) = RecordingSink::new();
        let options = StreamOptions::new().supports_initial_handshake(true);
        let writer = EventWriter::spawn(sink, TaskCodec, signer(), &options);
        let initial = raw_frame(
            &[(":message-type", "event"), (":event-type", "initial-response")],
            br#""accepted""#,
        );
        let mut stream: TaskStream =
            EventStream::new(Some(writer), Some(reader(vec![Ok(initial)], &options)));

        let response = stream.handshake("job-1".to_string()).await.unwrap();
        assert_eq!(response, "accepted");
        stream.close().await.unwrap();

        let inner = inner_frames(&log.frames());
        assert_eq!(
            inner[0].headers().get_str(header_names::EVENT_TYPE),
            Some("initial-request")
        );
    }

    #[tokio::test]
    async fn test_missing_halves() {
        let mut output_only: TaskStream = EventStream::new(
            Some(EventWriter::spawn(
                RecordingSink::new().0,
                TaskCodec,
                signer(),
                &StreamOptions::new(),
            )),
            None,
        );
        assert!(output_only.recv().await.is_none());
        assert!(matches!(
            output_only.initial_response().await,
            Err(StreamError::Protocol(_))
        ));
        output_only.close().await.unwrap();

        let input_only: TaskStream =
            EventStream::new(None, Some(reader(vec![], &StreamOptions::new())));
        assert!(matches!(
            input_only.send(TaskEvent::Start).await,
            Err(StreamError::Protocol(_))
        ));
        input_only.close().await.unwrap();
    }
}
