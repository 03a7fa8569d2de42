//! Message classification.
//!
//! Maps the `:message-type` discriminator (and, for known categories, the
//! sub-tag header they require) to a [`MessageKind`]. Unrecognized
//! discriminator values never fail; only missing headers do.

use crate::error::MissingHeader;
use crate::header::{Headers, handshake_tags, header_names, message_types};

/// Category named by the `:message-type` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Event,
    Exception,
    Error,
    /// Any value this reader does not know about.
    Unknown(String),
}

impl MessageType {
    pub fn from_value(value: &str) -> Self {
        match value {
            message_types::EVENT => MessageType::Event,
            message_types::EXCEPTION => MessageType::Exception,
            message_types::ERROR => MessageType::Error,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Event => message_types::EVENT,
            MessageType::Exception => message_types::EXCEPTION,
            MessageType::Error => message_types::ERROR,
            MessageType::Unknown(tag) => tag,
        }
    }
}

/// Fully resolved category of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A regular event union member.
    Data { event_type: String },
    InitialRequest,
    InitialResponse,
    /// A modeled exception, terminal for the stream.
    Exception { exception_type: String },
    /// A generic service error, terminal for the stream.
    Error,
    /// A discriminator value this reader does not recognize.
    Unknown { tag: String },
}

/// Classify a frame by its headers.
///
/// Non-string header values are read through their display form so that a
/// peer using an unexpected value type still classifies deterministically.
pub fn classify(headers: &Headers) -> Result<MessageKind, MissingHeader> {
    let message_type = header_text(headers, header_names::MESSAGE_TYPE)
        .ok_or(MissingHeader(header_names::MESSAGE_TYPE))?;

    let kind = match MessageType::from_value(&message_type) {
        MessageType::Event => {
            let event_type = header_text(headers, header_names::EVENT_TYPE)
                .ok_or(MissingHeader(header_names::EVENT_TYPE))?;
            match event_type.as_str() {
                handshake_tags::INITIAL_REQUEST => MessageKind::InitialRequest,
                handshake_tags::INITIAL_RESPONSE => MessageKind::InitialResponse,
                _ => MessageKind::Data { event_type },
            }
        }
        MessageType::Exception => {
            let exception_type = header_text(headers, header_names::EXCEPTION_TYPE)
                .ok_or(MissingHeader(header_names::EXCEPTION_TYPE))?;
            MessageKind::Exception { exception_type }
        }
        MessageType::Error => MessageKind::Error,
        MessageType::Unknown(tag) => MessageKind::Unknown { tag },
    };
    Ok(kind)
}

fn header_text(headers: &Headers, name: &str) -> Option<String> {
    headers.get(name).map(|value| match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    })
}
