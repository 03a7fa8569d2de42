//! Signed, bidirectional event streams over a duplex HTTP body.
//!
//! An event stream multiplexes typed messages over one long-lived HTTP
//! exchange. Each outbound message is serialized into a frame, wrapped in
//! a signed envelope whose signature chains from the previous one, and
//! written by a dedicated writer task. Inbound frames are decoded,
//! classified and dispatched by a reader task.
//!
//! ## Features
//!
//! - Concurrent `send` from many tasks, serialized onto one connection
//! - SigV4 chunk signature chaining
//! - Optional `initial-request`/`initial-response` handshake
//! - Forward-compatible delivery of unknown message types
//! - One-shot, idempotent shutdown of each half and of the pair
//!
//! ## Example
//!
//! ```ignore
//! use eventstream_client::signer::{Credentials, SigV4ChunkSigner, StreamSigner, seed_signature_from_headers};
//! use eventstream_client::transport::{self, request_body};
//! use eventstream_client::{EventReader, EventStream, EventWriter, StreamOptions};
//!
//! let options = StreamOptions::new().supports_initial_handshake(true);
//!
//! // Outbound half: the writer task feeds the request body.
//! let (body_writer, body) = request_body(4);
//! let mut request = http::Request::post(url).body(body)?;
//! transport::prepare_request_headers(request.headers_mut());
//! sign_request(&mut request);
//!
//! let seed = seed_signature_from_headers(request.headers())?;
//! let signer = StreamSigner::new(SigV4ChunkSigner::new(credentials, "us-east-1", "transcribe", seed));
//! let writer = EventWriter::spawn(body_writer, AudioSerializer, signer, &options);
//!
//! // Inbound half: the reader task consumes the response body.
//! let response = http_client.request(request).await?;
//! let (_parts, source) = transport::response_stream(response)?;
//! let reader = EventReader::spawn(source, TranscriptDeserializer, &options);
//!
//! let mut stream = EventStream::new(Some(writer), Some(reader));
//! let session = stream.handshake(StartRequest::default()).await?;
//!
//! stream.send(AudioEvent::chunk(samples)).await?;
//! while let Some(item) = stream.recv().await {
//!     if let Some(transcript) = item.into_event() {
//!         println!("{transcript:?}");
//!     }
//! }
//! stream.close().await?;
//! ```
//!
//! ## Shutdown
//!
//! Closing the writer drains events already accepted, writes a signed empty
//! end-of-stream frame and closes the request body. Closing the reader
//! stops dispatch and releases the response body. Each `close` is safe to
//! call any number of times and from any task.
//!
//! ## Errors
//!
//! All operations return [`StreamError`]. A service exception or generic
//! error frame from the peer ends the stream and is reported by `err()`;
//! [`StreamError::is_terminal_service_error`] tells those apart from
//! transport failures.

mod codec;
mod config;
mod error;
mod event;
mod logging;
pub mod payload;
mod reader;
pub mod signer;
mod stream;
mod sync;
pub mod transport;
mod writer;

#[cfg(test)]
mod test_support;

pub use codec::{EventDeserializer, EventSerializer, event_type_matches};
pub use config::{StreamOptions, StreamRole};
pub use error::{GenericApiError, ServiceException, StreamError, UNKNOWN_ERROR};
pub use event::{Event, Received, UnknownEvent};
pub use reader::EventReader;
pub use signer::{Credentials, EventSigner, SigV4ChunkSigner, StreamSigner};
pub use stream::EventStream;
pub use writer::EventWriter;

// Re-export the wire primitives
pub use eventstream_core;
pub use eventstream_core::{Frame, HeaderValue, Headers, header_names, message_types};
