//! Typed frame headers.
//!
//! Each header is encoded as:
//!
//! ```text
//! [name_len:1][name:name_len][type:1][value]
//! ```
//!
//! Byte array and string values carry a 2-byte big-endian length prefix;
//! the remaining types have a fixed width.

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Reserved header names.
pub mod header_names {
    /// Discriminator header identifying the message category.
    pub const MESSAGE_TYPE: &str = ":message-type";
    /// Sub-tag naming the event union member.
    pub const EVENT_TYPE: &str = ":event-type";
    /// Sub-tag naming the modeled exception.
    pub const EXCEPTION_TYPE: &str = ":exception-type";
    pub const ERROR_CODE: &str = ":error-code";
    pub const ERROR_MESSAGE: &str = ":error-message";
    pub const CONTENT_TYPE: &str = ":content-type";
    /// Signing timestamp on signed envelope frames.
    pub const DATE: &str = ":date";
    /// Chained chunk signature on signed envelope frames.
    pub const CHUNK_SIGNATURE: &str = ":chunk-signature";
}

/// Values of the `:message-type` header.
pub mod message_types {
    pub const EVENT: &str = "event";
    pub const EXCEPTION: &str = "exception";
    pub const ERROR: &str = "error";
}

/// `:event-type` values reserved for the initial handshake.
pub mod handshake_tags {
    pub const INITIAL_REQUEST: &str = "initial-request";
    pub const INITIAL_RESPONSE: &str = "initial-response";
}

mod value_type {
    pub const BOOL_TRUE: u8 = 0;
    pub const BOOL_FALSE: u8 = 1;
    pub const BYTE: u8 = 2;
    pub const INT16: u8 = 3;
    pub const INT32: u8 = 4;
    pub const INT64: u8 = 5;
    pub const BYTE_ARRAY: u8 = 6;
    pub const STRING: u8 = 7;
    pub const TIMESTAMP: u8 = 8;
    pub const UUID: u8 = 9;
}

/// A typed header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    ByteArray(Bytes),
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl HeaderValue {
    /// Returns the string contents if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes if this is a byte array value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            HeaderValue::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            HeaderValue::Bool(true) => value_type::BOOL_TRUE,
            HeaderValue::Bool(false) => value_type::BOOL_FALSE,
            HeaderValue::Byte(_) => value_type::BYTE,
            HeaderValue::Int16(_) => value_type::INT16,
            HeaderValue::Int32(_) => value_type::INT32,
            HeaderValue::Int64(_) => value_type::INT64,
            HeaderValue::ByteArray(_) => value_type::BYTE_ARRAY,
            HeaderValue::String(_) => value_type::STRING,
            HeaderValue::Timestamp(_) => value_type::TIMESTAMP,
            HeaderValue::Uuid(_) => value_type::UUID,
        }
    }

    fn encode(&self, name: &str, buf: &mut BytesMut) -> Result<(), FrameError> {
        buf.put_u8(self.type_tag());
        match self {
            HeaderValue::Bool(_) => {}
            HeaderValue::Byte(v) => buf.put_i8(*v),
            HeaderValue::Int16(v) => buf.put_i16(*v),
            HeaderValue::Int32(v) => buf.put_i32(*v),
            HeaderValue::Int64(v) | HeaderValue::Timestamp(v) => buf.put_i64(*v),
            HeaderValue::ByteArray(v) => put_prefixed(name, v, buf)?,
            HeaderValue::String(v) => put_prefixed(name, v.as_bytes(), buf)?,
            HeaderValue::Uuid(v) => buf.put_slice(v),
        }
        Ok(())
    }

    fn decode(name: &str, buf: &mut &[u8]) -> Result<Self, FrameError> {
        let tag = take_u8(buf)?;
        let value = match tag {
            value_type::BOOL_TRUE => HeaderValue::Bool(true),
            value_type::BOOL_FALSE => HeaderValue::Bool(false),
            value_type::BYTE => HeaderValue::Byte(take_u8(buf)? as i8),
            value_type::INT16 => {
                ensure(buf, 2)?;
                HeaderValue::Int16(buf.get_i16())
            }
            value_type::INT32 => {
                ensure(buf, 4)?;
                HeaderValue::Int32(buf.get_i32())
            }
            value_type::INT64 => {
                ensure(buf, 8)?;
                HeaderValue::Int64(buf.get_i64())
            }
            value_type::BYTE_ARRAY => {
                HeaderValue::ByteArray(Bytes::copy_from_slice(take_prefixed(buf)?))
            }
            value_type::STRING => {
                let raw = take_prefixed(buf)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|_| FrameError::InvalidUtf8(name.to_string()))?;
                HeaderValue::String(s.to_string())
            }
            value_type::TIMESTAMP => {
                ensure(buf, 8)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            value_type::UUID => {
                ensure(buf, 16)?;
                let mut uuid = [0u8; 16];
                buf.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => return Err(FrameError::UnknownHeaderType(other)),
        };
        Ok(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<Bytes> for HeaderValue {
    fn from(value: Bytes) -> Self {
        HeaderValue::ByteArray(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int32(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int64(value)
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Bool(v) => write!(f, "{v}"),
            HeaderValue::Byte(v) => write!(f, "{v}"),
            HeaderValue::Int16(v) => write!(f, "{v}"),
            HeaderValue::Int32(v) => write!(f, "{v}"),
            HeaderValue::Int64(v) => write!(f, "{v}"),
            HeaderValue::ByteArray(v) => {
                for b in v.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            HeaderValue::String(v) => f.write_str(v),
            HeaderValue::Timestamp(v) => write!(f, "{v}ms"),
            HeaderValue::Uuid(v) => {
                for (i, b) in v.iter().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A named header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: HeaderValue,
}

/// An ordered set of headers with unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing an existing value with the same name in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|h| h.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Header { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0.iter().find(|h| h.name == name).map(|h| &h.value)
    }

    /// Get a header's value if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let idx = self.0.iter().position(|h| h.name == name)?;
        Some(self.0.remove(idx).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append the wire encoding of every header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), FrameError> {
        for header in &self.0 {
            let name = header.name.as_bytes();
            if name.is_empty() || name.len() > u8::MAX as usize {
                return Err(FrameError::InvalidHeaderName(name.len()));
            }
            buf.put_u8(name.len() as u8);
            buf.put_slice(name);
            header.value.encode(&header.name, buf)?;
        }
        Ok(())
    }

    /// Encode the header set into a standalone buffer.
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a complete header block.
    ///
    /// A repeated name replaces the earlier value in place.
    pub fn decode(mut data: &[u8]) -> Result<Self, FrameError> {
        let mut headers: Vec<Header> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        while !data.is_empty() {
            let name_len = take_u8(&mut data)? as usize;
            if name_len == 0 {
                return Err(FrameError::InvalidHeaderName(0));
            }
            ensure(&data, name_len)?;
            let (raw, rest) = data.split_at(name_len);
            data = rest;
            let name = std::str::from_utf8(raw)
                .map_err(|_| FrameError::InvalidUtf8("<header name>".to_string()))?;
            let value = HeaderValue::decode(name, &mut data)?;
            match index.get(name) {
                Some(&i) => headers[i].value = value,
                None => {
                    index.insert(name, headers.len());
                    headers.push(Header {
                        name: name.to_string(),
                        value,
                    });
                }
            }
        }
        Ok(Headers(headers))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, header) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", header.name, header.value)?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn put_prefixed(name: &str, value: &[u8], buf: &mut BytesMut) -> Result<(), FrameError> {
    if value.len() > u16::MAX as usize {
        return Err(FrameError::HeaderValueTooLong {
            name: name.to_string(),
            len: value.len(),
        });
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

fn ensure(buf: &&[u8], n: usize) -> Result<(), FrameError> {
    if buf.len() < n {
        Err(FrameError::TruncatedHeaders)
    } else {
        Ok(())
    }
}

fn take_u8(buf: &mut &[u8]) -> Result<u8, FrameError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn take_prefixed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], FrameError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let data: &'a [u8] = *buf;
    let (value, rest) = data.split_at(len);
    *buf = rest;
    Ok(value)
}
