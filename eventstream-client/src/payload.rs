//! Payload helpers for serializer and deserializer implementations.
//!
//! Writers set `:content-type` alongside the payload; readers do not
//! require it.

use bytes::Bytes;
use eventstream_core::{Frame, header_names};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StreamError;

/// Payload content types.
pub mod content_types {
    pub const JSON: &str = "application/json";
    pub const TEXT: &str = "text/plain";
    pub const BLOB: &str = "application/octet-stream";
}

/// Serialize `value` as the frame's JSON payload.
pub fn set_json<T: Serialize + ?Sized>(frame: &mut Frame, value: &T) -> Result<(), StreamError> {
    let payload = serde_json::to_vec(value).map_err(StreamError::serialization)?;
    frame
        .headers_mut()
        .set(header_names::CONTENT_TYPE, content_types::JSON);
    frame.set_payload(payload);
    Ok(())
}

/// Deserialize the frame's payload as JSON.
///
/// An empty payload is read as `{}` so unit-like members decode.
pub fn json<T: DeserializeOwned>(frame: &Frame) -> Result<T, StreamError> {
    let payload: &[u8] = if frame.payload().is_empty() {
        b"{}"
    } else {
        frame.payload()
    };
    serde_json::from_slice(payload).map_err(StreamError::serialization)
}

pub fn set_text(frame: &mut Frame, text: impl Into<String>) {
    frame
        .headers_mut()
        .set(header_names::CONTENT_TYPE, content_types::TEXT);
    frame.set_payload(text.into());
}

pub fn text(frame: &Frame) -> Result<String, StreamError> {
    String::from_utf8(frame.payload().to_vec()).map_err(StreamError::serialization)
}

pub fn set_blob(frame: &mut Frame, data: Bytes) {
    frame
        .headers_mut()
        .set(header_names::CONTENT_TYPE, content_types::BLOB);
    frame.set_payload(data);
}

pub fn blob(frame: &Frame) -> Bytes {
    frame.payload().clone()
}
