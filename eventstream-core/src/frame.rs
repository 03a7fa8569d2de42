//! Event-stream frame encoding and decoding.
//!
//! Every frame on the wire has the layout:
//!
//! ```text
//! [total_len:4][headers_len:4][prelude_crc:4][headers][payload][message_crc:4]
//! ```
//!
//! All integers are big-endian. `prelude_crc` is the CRC-32 of the first
//! eight bytes and `message_crc` is the CRC-32 of everything before it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::header::{HeaderValue, Headers};

/// Size of the prelude (total length, headers length, prelude CRC).
pub const PRELUDE_SIZE: usize = 12;

/// Size of the trailing message CRC.
pub const MESSAGE_CRC_SIZE: usize = 4;

/// Smallest possible frame: empty headers and payload.
pub const MIN_FRAME_SIZE: usize = PRELUDE_SIZE + MESSAGE_CRC_SIZE;

pub const MAX_HEADERS_LEN: usize = 128 * 1024;

pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// One unit of the wire protocol: a header set plus payload bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    headers: Headers,
    payload: Bytes,
}

impl Frame {
    pub fn new(headers: Headers, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Builder-style header setter.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn into_parts(self) -> (Headers, Bytes) {
        (self.headers, self.payload)
    }

    /// Encode this frame into a new buffer.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), FrameError> {
        let headers = self.headers.to_bytes()?;
        encode_raw(&headers, &self.payload, buf)
    }

    /// Decode exactly one frame from `data`.
    pub fn decode(data: &[u8]) -> Result<Frame, FrameError> {
        if data.len() < PRELUDE_SIZE {
            return Err(FrameError::LengthMismatch {
                expected: MIN_FRAME_SIZE,
                actual: data.len(),
            });
        }
        let prelude = Prelude::parse(&data[..PRELUDE_SIZE])?;
        if data.len() != prelude.total_len {
            return Err(FrameError::LengthMismatch {
                expected: prelude.total_len,
                actual: data.len(),
            });
        }
        decode_body(&prelude, data)
    }
}

/// Encode pre-encoded headers and a payload as one frame.
///
/// Used by signers, which need the encoded header bytes before the final
/// frame is assembled.
pub fn encode_raw(headers: &[u8], payload: &[u8], buf: &mut BytesMut) -> Result<(), FrameError> {
    if headers.len() > MAX_HEADERS_LEN {
        return Err(FrameError::HeadersTooLarge(headers.len()));
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let total_len = MIN_FRAME_SIZE + headers.len() + payload.len();
    let start = buf.len();
    buf.reserve(total_len);
    buf.put_u32(total_len as u32);
    buf.put_u32(headers.len() as u32);
    let prelude_crc = crc32fast::hash(&buf[start..start + 8]);
    buf.put_u32(prelude_crc);
    buf.put_slice(headers);
    buf.put_slice(payload);
    let message_crc = crc32fast::hash(&buf[start..]);
    buf.put_u32(message_crc);
    Ok(())
}

/// Parsed and checksum-verified frame prelude.
#[derive(Debug, Clone, Copy)]
struct Prelude {
    total_len: usize,
    headers_len: usize,
}

impl Prelude {
    fn parse(mut data: &[u8]) -> Result<Self, FrameError> {
        let expected_crc = crc32fast::hash(&data[..8]);
        let total = data.get_u32();
        let headers = data.get_u32();
        let crc = data.get_u32();
        if crc != expected_crc {
            return Err(FrameError::PreludeChecksum {
                expected: crc,
                actual: expected_crc,
            });
        }

        if (total as usize) < MIN_FRAME_SIZE {
            return Err(FrameError::TooShort(total));
        }
        if headers as usize > MAX_HEADERS_LEN {
            return Err(FrameError::HeadersTooLarge(headers as usize));
        }
        let Some(payload_len) = (total as usize).checked_sub(MIN_FRAME_SIZE + headers as usize)
        else {
            return Err(FrameError::InvalidLengths { total, headers });
        };
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload_len));
        }

        Ok(Prelude {
            total_len: total as usize,
            headers_len: headers as usize,
        })
    }
}

fn decode_body(prelude: &Prelude, data: &[u8]) -> Result<Frame, FrameError> {
    let crc_offset = prelude.total_len - MESSAGE_CRC_SIZE;
    let expected = u32::from_be_bytes([
        data[crc_offset],
        data[crc_offset + 1],
        data[crc_offset + 2],
        data[crc_offset + 3],
    ]);
    let actual = crc32fast::hash(&data[..crc_offset]);
    if expected != actual {
        return Err(FrameError::MessageChecksum { expected, actual });
    }

    let headers_end = PRELUDE_SIZE + prelude.headers_len;
    let headers = Headers::decode(&data[PRELUDE_SIZE..headers_end])?;
    let payload = Bytes::copy_from_slice(&data[headers_end..crc_offset]);
    Ok(Frame { headers, payload })
}

/// Incremental frame decoder over a chunked byte source.
///
/// Feed bytes with [`extend`](Self::extend) as they arrive and pull complete
/// frames with [`try_next`](Self::try_next).
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: BytesMut,
    prelude: Option<Prelude>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Try to take one complete frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if the buffered bytes are malformed
    pub fn try_next(&mut self) -> Result<Option<Frame>, FrameError> {
        let prelude = match self.prelude {
            Some(prelude) => prelude,
            None => {
                if self.buffer.len() < PRELUDE_SIZE {
                    return Ok(None);
                }
                let prelude = Prelude::parse(&self.buffer[..PRELUDE_SIZE])?;
                self.prelude = Some(prelude);
                prelude
            }
        };

        if self.buffer.len() < prelude.total_len {
            return Ok(None);
        }

        let frame_bytes = self.buffer.split_to(prelude.total_len);
        self.prelude = None;
        decode_body(&prelude, &frame_bytes).map(Some)
    }

    /// Signal end of input; errors if a partial frame is still buffered.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(FrameError::UnexpectedEof(self.buffer.len()))
        }
    }
}
