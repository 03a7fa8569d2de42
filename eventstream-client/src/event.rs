//! The event union carried over a stream.

use bytes::Bytes;
use eventstream_core::{Frame, FrameError, handshake_tags};

use crate::error::{GenericApiError, ServiceException};

/// Every message category an event stream can carry.
///
/// `E` is the stream's event union and `H` the handshake payload type
/// (`()` for streams without an initial handshake).
#[derive(Clone, Debug, PartialEq)]
pub enum Event<E, H = ()> {
    Data(E),
    InitialRequest(H),
    InitialResponse(H),
    Exception(ServiceException),
    GenericError(GenericApiError),
    /// A message this side does not recognize, kept verbatim.
    Unknown(UnknownEvent),
}

impl<E, H> Event<E, H> {
    /// The `:event-type` tag of a handshake message, `None` for every other
    /// member.
    pub fn handshake_tag(&self) -> Option<&'static str> {
        match self {
            Event::InitialRequest(_) => Some(handshake_tags::INITIAL_REQUEST),
            Event::InitialResponse(_) => Some(handshake_tags::INITIAL_RESPONSE),
            _ => None,
        }
    }
}

/// A frame with an unrecognized `:message-type` or `:event-type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownEvent {
    tag: String,
    frame: Frame,
}

impl UnknownEvent {
    pub fn new(tag: impl Into<String>, frame: Frame) -> Self {
        Self {
            tag: tag.into(),
            frame,
        }
    }

    /// The unrecognized tag value.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    /// The raw frame re-encoded to its wire form.
    pub fn encoded(&self) -> Result<Bytes, FrameError> {
        self.frame.encode()
    }
}

/// An item on a reader's main feed.
#[derive(Clone, Debug, PartialEq)]
pub enum Received<E> {
    Event(E),
    Unknown(UnknownEvent),
}

impl<E> Received<E> {
    /// Returns the event, discarding unknown messages.
    pub fn into_event(self) -> Option<E> {
        match self {
            Received::Event(event) => Some(event),
            Received::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Received::Unknown(_))
    }
}
