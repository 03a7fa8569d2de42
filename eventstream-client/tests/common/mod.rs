#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use eventstream_client::transport::{body_to_stream, request_body};
use eventstream_client::{
    Credentials, EventDeserializer, EventReader, EventSerializer, EventWriter, Frame,
    SigV4ChunkSigner, StreamError, StreamOptions, StreamSigner, event_type_matches, header_names,
    payload,
};
use futures::Sink;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Start,
    Progress(u32),
    Log(String),
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub priority: u8,
}

#[derive(Serialize, Deserialize)]
struct ProgressBody {
    percent: u32,
}

pub struct JobCodec;

impl EventSerializer for JobCodec {
    type Event = JobEvent;
    type Handshake = JobConfig;

    fn serialize_event(&self, event: &JobEvent, frame: &mut Frame) -> Result<(), StreamError> {
        match event {
            JobEvent::Start => {
                frame.headers_mut().set(header_names::EVENT_TYPE, "Start");
            }
            JobEvent::Progress(percent) => {
                frame.headers_mut().set(header_names::EVENT_TYPE, "Progress");
                payload::set_json(frame, &ProgressBody { percent: *percent })?;
            }
            JobEvent::Log(line) => {
                frame.headers_mut().set(header_names::EVENT_TYPE, "Log");
                payload::set_text(frame, line);
            }
            JobEvent::Done => {
                frame.headers_mut().set(header_names::EVENT_TYPE, "Done");
            }
        }
        Ok(())
    }

    fn serialize_handshake(&self, value: &JobConfig, frame: &mut Frame) -> Result<(), StreamError> {
        payload::set_json(frame, value)
    }
}

impl EventDeserializer for JobCodec {
    type Event = JobEvent;
    type Handshake = JobConfig;

    fn deserialize_event(
        &self,
        event_type: &str,
        frame: &Frame,
    ) -> Result<Option<JobEvent>, StreamError> {
        let event = if event_type_matches(event_type, "Start") {
            JobEvent::Start
        } else if event_type_matches(event_type, "Progress") {
            JobEvent::Progress(payload::json::<ProgressBody>(frame)?.percent)
        } else if event_type_matches(event_type, "Log") {
            JobEvent::Log(payload::text(frame)?)
        } else if event_type_matches(event_type, "Done") {
            JobEvent::Done
        } else {
            return Ok(None);
        };
        Ok(Some(event))
    }

    fn deserialize_handshake(&self, frame: &Frame) -> Result<JobConfig, StreamError> {
        payload::json(frame)
    }
}

pub fn signer() -> StreamSigner {
    StreamSigner::new(SigV4ChunkSigner::new(
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
        "us-west-2",
        "jobs",
        vec![0xab; 32],
    ))
}

/// Counts frame writes and close calls on the wrapped sink.
pub struct CountingSink<S> {
    inner: S,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub writes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl<S> CountingSink<S> {
    pub fn new(inner: S) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                inner,
                counters: counters.clone(),
            },
            counters,
        )
    }
}

impl<S> Sink<Bytes> for CountingSink<S>
where
    S: Sink<Bytes, Error = StreamError> + Unpin,
{
    type Error = StreamError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.inner).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), StreamError> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

/// A writer connected to a reader through an in-memory request body.
pub struct Pipe {
    pub writer: EventWriter<JobEvent, JobConfig>,
    pub reader: EventReader<JobEvent, JobConfig>,
    pub counters: Arc<Counters>,
}

pub fn pipe(writer_options: &StreamOptions, reader_options: &StreamOptions) -> Pipe {
    let (body_writer, body) = request_body(8);
    let (sink, counters) = CountingSink::new(body_writer);
    Pipe {
        writer: EventWriter::spawn(sink, JobCodec, signer(), writer_options),
        reader: EventReader::spawn(body_to_stream(body), JobCodec, reader_options),
        counters,
    }
}
