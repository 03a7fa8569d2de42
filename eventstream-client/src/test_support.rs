//! Shared fixtures for unit tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use eventstream_core::{Frame, header_names};
use futures::Sink;
use futures::task::AtomicWaker;
use serde::{Deserialize, Serialize};

use crate::codec::{EventDeserializer, EventSerializer, event_type_matches};
use crate::error::StreamError;
use crate::payload;
use crate::signer::{Credentials, SigV4ChunkSigner, StreamSigner};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TaskEvent {
    Start,
    Progress(u32),
    Done,
    /// Always fails to serialize.
    Poison,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProgressBody {
    pub(crate) percent: u32,
}

pub(crate) struct TaskCodec;

impl EventSerializer for TaskCodec {
    type Event = TaskEvent;
    type Handshake = String;

    fn serialize_event(&self, event: &TaskEvent, frame: &mut Frame) -> Result<(), StreamError> {
        let headers = frame.headers_mut();
        match event {
            TaskEvent::Start => headers.set(header_names::EVENT_TYPE, "Start"),
            TaskEvent::Done => headers.set(header_names::EVENT_TYPE, "Done"),
            TaskEvent::Progress(percent) => {
                headers.set(header_names::EVENT_TYPE, "Progress");
                payload::set_json(frame, &ProgressBody { percent: *percent })?;
            }
            TaskEvent::Poison => {
                return Err(StreamError::Serialization("poisoned event".into()));
            }
        }
        Ok(())
    }

    fn serialize_handshake(&self, value: &String, frame: &mut Frame) -> Result<(), StreamError> {
        payload::set_json(frame, value)
    }
}

impl EventDeserializer for TaskCodec {
    type Event = TaskEvent;
    type Handshake = String;

    fn deserialize_event(
        &self,
        event_type: &str,
        frame: &Frame,
    ) -> Result<Option<TaskEvent>, StreamError> {
        let event = if event_type_matches(event_type, "Start") {
            TaskEvent::Start
        } else if event_type_matches(event_type, "Done") {
            TaskEvent::Done
        } else if event_type_matches(event_type, "Progress") {
            TaskEvent::Progress(payload::json::<ProgressBody>(frame)?.percent)
        } else {
            return Ok(None);
        };
        Ok(Some(event))
    }

    fn deserialize_handshake(&self, frame: &Frame) -> Result<String, StreamError> {
        payload::json(frame)
    }
}

pub(crate) fn signer() -> StreamSigner {
    StreamSigner::new(SigV4ChunkSigner::new(
        Credentials::new("AKIDEXAMPLE", "secret"),
        "us-east-1",
        "transcribe",
        vec![0; 32],
    ))
}

#[derive(Debug, Default)]
pub(crate) struct SinkLog {
    frames: Mutex<Vec<Bytes>>,
    pub(crate) closes: AtomicUsize,
}

impl SinkLog {
    pub(crate) fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().unwrap().clone()
    }
}

/// Records written frames and counts close calls.
pub(crate) struct RecordingSink {
    log: Arc<SinkLog>,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        (Self { log: log.clone() }, log)
    }
}

impl Sink<Bytes> for RecordingSink {
    type Error = StreamError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), StreamError> {
        self.log.frames.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// A peer that never accepts a write.
pub(crate) struct StalledSink;

impl Sink<Bytes> for StalledSink {
    type Error = StreamError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Bytes) -> Result<(), StreamError> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Poll::Ready(Ok(()))
    }
}

/// Opens a [`GatedSink`] from outside the writer task.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: AtomicBool,
    waker: AtomicWaker,
}

impl Gate {
    pub(crate) fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.waker.wake();
    }
}

/// A [`RecordingSink`] that holds every write until its gate opens.
pub(crate) struct GatedSink {
    inner: RecordingSink,
    gate: Arc<Gate>,
}

impl GatedSink {
    pub(crate) fn new() -> (Self, Arc<Gate>, Arc<SinkLog>) {
        let (inner, log) = RecordingSink::new();
        let gate = Arc::new(Gate::default());
        (
            Self {
                inner,
                gate: gate.clone(),
            },
            gate,
            log,
        )
    }
}

impl Sink<Bytes> for GatedSink {
    type Error = StreamError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.gate.waker.register(cx.waker());
        if !self.gate.open.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Pin::new(&mut self.inner).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), StreamError> {
        Pin::new(&mut self.inner).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

/// Decode each written chunk as a signed envelope.
pub(crate) fn envelopes(written: &[Bytes]) -> Vec<Frame> {
    written.iter().map(|b| Frame::decode(b).unwrap()).collect()
}

/// Decode the event frames carried inside non-empty envelopes.
pub(crate) fn inner_frames(written: &[Bytes]) -> Vec<Frame> {
    envelopes(written)
        .iter()
        .filter(|f| !f.payload().is_empty())
        .map(|f| Frame::decode(f.payload()).unwrap())
        .collect()
}

/// Encode a frame from header pairs and a payload.
pub(crate) fn raw_frame(headers: &[(&str, &str)], payload: &'static [u8]) -> Bytes {
    let mut frame = Frame::new(Default::default(), Bytes::from_static(payload));
    for (name, value) in headers {
        frame.headers_mut().set(*name, *value);
    }
    frame.encode().unwrap()
}
