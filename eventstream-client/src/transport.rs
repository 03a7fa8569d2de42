//! HTTP plumbing for event streams.
//!
//! An event stream rides on one long-lived HTTP exchange: the request body
//! carries outbound frames and the response body carries inbound frames.
//! This module adapts both sides to the shapes the writer and reader tasks
//! consume.
//!
//! # Example
//!
//! ```ignore
//! use eventstream_client::transport::{self, request_body};
//!
//! let (body_writer, body) = request_body(4);
//! let mut request = http::Request::post(url).body(body)?;
//! transport::prepare_request_headers(request.headers_mut());
//!
//! let response = http_client.request(request).await?;
//! let (parts, source) = transport::response_stream(response)?;
//! ```

mod body;

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http_body::Body;

use crate::error::StreamError;

pub use body::{BodyWriter, TransportBody, request_body};

/// Content type of an event stream body.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// The inbound byte source consumed by
/// [`EventReader::spawn`](crate::EventReader::spawn).
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Mark a request as carrying a streamed event stream body.
pub fn prepare_request_headers(headers: &mut HeaderMap) {
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.remove(CONTENT_LENGTH);
}

/// Adapt an HTTP body into a byte source.
///
/// Trailers and empty data frames are skipped; body errors become
/// [`StreamError::Transport`].
pub fn body_to_stream<B>(body: B) -> ByteStream
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    use http_body_util::BodyExt;

    Box::pin(
        futures::stream::unfold(Box::pin(body), |mut body| async move {
            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => Some((Ok(data), body)),
                    // trailers
                    Err(_) => Some((Ok(Bytes::new()), body)),
                },
                Some(Err(e)) => Some((
                    Err(StreamError::Transport(format!("stream error: {e}"))),
                    body,
                )),
                None => None,
            }
        })
        .filter(|result| {
            futures::future::ready(match result {
                Ok(bytes) => !bytes.is_empty(),
                Err(_) => true,
            })
        }),
    )
}

/// Validate an event stream response and return its parts and byte source.
///
/// A non-success status is a [`StreamError::Transport`]; a missing or
/// unexpected content type is a [`StreamError::Protocol`].
pub fn response_stream<B>(
    response: http::Response<B>,
) -> Result<(http::response::Parts, ByteStream), StreamError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    let (parts, body) = response.into_parts();

    if !parts.status.is_success() {
        return Err(StreamError::Transport(format!(
            "unexpected HTTP status {}",
            parts.status
        )));
    }

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim());
    match content_type {
        Some(ct) if ct.eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE) => {}
        Some(ct) => {
            return Err(StreamError::Protocol(format!(
                "unexpected response content type {ct:?}, expected {EVENT_STREAM_CONTENT_TYPE}"
            )));
        }
        None => {
            return Err(StreamError::Protocol(
                "event stream response has no content type".into(),
            ));
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(status = %parts.status, "event stream response accepted");

    Ok((parts, body_to_stream(body)))
}
