//! Per-stream serializer and deserializer traits.
//!
//! A stream's event union is mapped to frames by collaborator-supplied
//! implementations of [`EventSerializer`] (outbound) and
//! [`EventDeserializer`] (inbound). The transport sets `:message-type` and
//! the handshake `:event-type` itself; implementations fill in the member's
//! `:event-type`, payload and any header bindings.
//!
//! # Example
//!
//! ```ignore
//! use eventstream_client::{EventSerializer, StreamError, payload};
//! use eventstream_core::{Frame, header_names};
//!
//! enum Audio { Chunk(bytes::Bytes) }
//!
//! struct AudioSerializer;
//!
//! impl EventSerializer for AudioSerializer {
//!     type Event = Audio;
//!     type Handshake = ();
//!
//!     fn serialize_event(&self, event: &Audio, frame: &mut Frame) -> Result<(), StreamError> {
//!         match event {
//!             Audio::Chunk(data) => {
//!                 frame.headers_mut().set(header_names::EVENT_TYPE, "AudioEvent");
//!                 payload::set_blob(frame, data.clone());
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use eventstream_core::Frame;

use crate::error::{ServiceException, StreamError};

/// Serializes outbound event union members into frames.
pub trait EventSerializer: Send + Sync + 'static {
    type Event: Send + 'static;
    type Handshake: Send + 'static;

    /// Serialize one event. Must set `:event-type` and the payload.
    fn serialize_event(&self, event: &Self::Event, frame: &mut Frame) -> Result<(), StreamError>;

    /// Serialize the initial handshake payload.
    fn serialize_handshake(
        &self,
        _value: &Self::Handshake,
        _frame: &mut Frame,
    ) -> Result<(), StreamError> {
        Err(StreamError::Serialization(
            "initial handshake messages are not supported by this serializer".into(),
        ))
    }
}

/// Deserializes inbound frames into event union members.
pub trait EventDeserializer: Send + Sync + 'static {
    type Event: Send + 'static;
    type Handshake: Send + 'static;

    /// Deserialize a data frame tagged `event_type`.
    ///
    /// Returns `Ok(None)` for members this union does not know; the reader
    /// delivers those as unknown events.
    fn deserialize_event(
        &self,
        event_type: &str,
        frame: &Frame,
    ) -> Result<Option<Self::Event>, StreamError>;

    /// Deserialize the initial handshake payload.
    fn deserialize_handshake(&self, _frame: &Frame) -> Result<Self::Handshake, StreamError> {
        Err(StreamError::Serialization(
            "initial handshake messages are not supported by this deserializer".into(),
        ))
    }

    /// Deserialize an exception frame into the stream's terminal exception.
    fn deserialize_exception(
        &self,
        exception_type: &str,
        frame: &Frame,
    ) -> Result<ServiceException, StreamError> {
        Ok(ServiceException::from_frame(exception_type, frame))
    }
}

/// Whether a received tag names the given union member.
///
/// Member names match ASCII case-insensitively.
pub fn event_type_matches(tag: &str, member: &str) -> bool {
    tag.eq_ignore_ascii_case(member)
}
