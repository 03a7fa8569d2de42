//! Event-stream error types.
//!
//! This module provides [`StreamError`], the error type for every writer,
//! reader and stream operation, plus the two application-level terminal
//! errors a remote peer can send: [`ServiceException`] and
//! [`GenericApiError`].

use bytes::Bytes;
use eventstream_core::{Frame, FrameError, Headers, MissingHeader, header_names, message_types};

/// Default code and message of a generic error frame without headers.
pub const UNKNOWN_ERROR: &str = "UnknownError";

/// Event-stream error variants.
///
/// `Service` and `GenericApi` are clean application-level ends of a stream;
/// every other variant is a transport or protocol failure.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream is closing or closed; the event was not sent.
    #[error("stream closed, unable to send event")]
    TransportClosed,

    /// The caller's cancellation fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// An event could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The chunk signature could not be computed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Malformed frame bytes.
    #[error("decode error: {0}")]
    Decode(#[from] FrameError),

    /// Protocol violation (missing discriminator, unexpected response, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure of the underlying connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// A modeled exception sent by the service.
    #[error(transparent)]
    Service(ServiceException),

    /// A generic error sent by the service.
    #[error(transparent)]
    GenericApi(GenericApiError),
}

impl StreamError {
    /// Whether this error is an application-level end of stream rather than
    /// a transport or protocol failure.
    pub fn is_terminal_service_error(&self) -> bool {
        matches!(self, StreamError::Service(_) | StreamError::GenericApi(_))
    }

    pub fn is_transport_closed(&self) -> bool {
        matches!(self, StreamError::TransportClosed)
    }

    pub(crate) fn serialization(err: impl std::fmt::Display) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

impl From<MissingHeader> for StreamError {
    fn from(err: MissingHeader) -> Self {
        StreamError::Protocol(err.to_string())
    }
}

/// A modeled exception received on (or sent over) an event stream.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{exception_type}: {}", .message.as_deref().unwrap_or("no message"))]
pub struct ServiceException {
    /// Value of the `:exception-type` header.
    pub exception_type: String,
    pub message: Option<String>,
    /// Raw exception payload.
    pub payload: Bytes,
}

impl ServiceException {
    pub fn new(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let payload = serde_json::to_vec(&serde_json::json!({ "message": message }))
            .map(Bytes::from)
            .unwrap_or_default();
        Self {
            exception_type: exception_type.into(),
            message: Some(message),
            payload,
        }
    }

    /// Build from an exception frame. The message is read from a JSON
    /// payload's `message` or `Message` field when present.
    pub fn from_frame(exception_type: &str, frame: &Frame) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(frame.payload())
            .ok()
            .and_then(|value| {
                ["message", "Message"]
                    .iter()
                    .find_map(|key| value.get(key)?.as_str().map(str::to_string))
            });
        Self {
            exception_type: exception_type.to_string(),
            message,
            payload: frame.payload().clone(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut headers = Headers::new();
        headers.set(header_names::MESSAGE_TYPE, message_types::EXCEPTION);
        headers.set(header_names::EXCEPTION_TYPE, self.exception_type.as_str());
        headers.set(header_names::CONTENT_TYPE, crate::payload::content_types::JSON);
        Frame::new(headers, self.payload.clone())
    }
}

/// A generic (unmodeled) service error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("api error {code}: {message}")]
pub struct GenericApiError {
    pub code: String,
    pub message: String,
}

impl GenericApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build from an error frame's `:error-code` and `:error-message`
    /// headers, defaulting both to `UnknownError`.
    pub fn from_frame(frame: &Frame) -> Self {
        let headers = frame.headers();
        let code = headers
            .get_str(header_names::ERROR_CODE)
            .unwrap_or(UNKNOWN_ERROR);
        let message = headers
            .get_str(header_names::ERROR_MESSAGE)
            .unwrap_or(UNKNOWN_ERROR);
        Self::new(code, message)
    }

    pub fn to_frame(&self) -> Frame {
        let mut headers = Headers::new();
        headers.set(header_names::MESSAGE_TYPE, message_types::ERROR);
        headers.set(header_names::ERROR_CODE, self.code.as_str());
        headers.set(header_names::ERROR_MESSAGE, self.message.as_str());
        Frame::new(headers, Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_closed_display() {
        assert_eq!(
            StreamError::TransportClosed.to_string(),
            "stream closed, unable to send event"
        );
    }

    #[test]
    fn test_missing_header_is_protocol_error() {
        let err: StreamError = MissingHeader(header_names::MESSAGE_TYPE).into();
        assert!(matches!(err, StreamError::Protocol(ref m) if m == ":message-type event header not present"));
    }

    #[test]
    fn test_frame_error_is_decode_error() {
        let err: StreamError = FrameError::UnexpectedEof(3).into();
        assert!(matches!(err, StreamError::Decode(FrameError::UnexpectedEof(3))));
        assert!(!err.is_terminal_service_error());
    }

    #[test]
    fn test_generic_error_defaults() {
        let frame = Frame::default().with_header(header_names::MESSAGE_TYPE, "error");
        let err = GenericApiError::from_frame(&frame);
        assert_eq!(err, GenericApiError::new("UnknownError", "UnknownError"));
    }

    #[test]
    fn test_generic_error_frame_round_trip() {
        let err = GenericApiError::new("Throttled", "rate exceeded");
        assert_eq!(GenericApiError::from_frame(&err.to_frame()), err);
        assert!(StreamError::GenericApi(err).is_terminal_service_error());
    }

    #[test]
    fn test_service_exception_message_field() {
        let frame = Frame::new(Headers::new(), Bytes::from_static(br#"{"Message":"bad input"}"#));
        let ex = ServiceException::from_frame("BadRequestException", &frame);
        assert_eq!(ex.message.as_deref(), Some("bad input"));
        assert_eq!(ex.to_string(), "BadRequestException: bad input");
    }

    #[test]
    fn test_service_exception_non_json_payload() {
        let frame = Frame::new(Headers::new(), Bytes::from_static(b"oops"));
        let ex = ServiceException::from_frame("InternalFailure", &frame);
        assert_eq!(ex.message, None);
        assert_eq!(ex.payload, Bytes::from_static(b"oops"));
    }

    #[test]
    fn test_service_exception_to_frame() {
        let ex = ServiceException::new("LimitExceededException", "too many");
        let frame = ex.to_frame();
        assert_eq!(
            frame.headers().get_str(header_names::EXCEPTION_TYPE),
            Some("LimitExceededException")
        );
        assert_eq!(ServiceException::from_frame("LimitExceededException", &frame), ex);
    }
}
