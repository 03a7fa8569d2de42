//! Error types for frame decoding and message classification.
//!
//! - [`FrameError`]: malformed or oversized frame bytes
//! - [`MissingHeader`]: a frame lacks a header its category requires

/// Errors produced while encoding or decoding frames.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Declared total length is below the fixed frame overhead.
    #[error("frame too short: declared {0} bytes, minimum is 16")]
    TooShort(u32),

    /// Header and total lengths in the prelude disagree.
    #[error("invalid frame lengths: total {total}, headers {headers}")]
    InvalidLengths { total: u32, headers: u32 },

    /// Input length does not match the declared total length.
    #[error("frame length mismatch: declared {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Prelude checksum mismatch.
    #[error("prelude checksum mismatch: expected 0x{expected:08x}, computed 0x{actual:08x}")]
    PreludeChecksum { expected: u32, actual: u32 },

    /// Whole-message checksum mismatch.
    #[error("message checksum mismatch: expected 0x{expected:08x}, computed 0x{actual:08x}")]
    MessageChecksum { expected: u32, actual: u32 },

    #[error("headers length {0} exceeds maximum of {max}", max = crate::MAX_HEADERS_LEN)]
    HeadersTooLarge(usize),

    #[error("payload length {0} exceeds maximum of {max}", max = crate::MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),

    /// Header names must be 1 to 255 bytes.
    #[error("invalid header name length: {0}")]
    InvalidHeaderName(usize),

    /// Byte array and string values are limited to `u16::MAX` bytes.
    #[error("value of header {name} is too long: {len} bytes")]
    HeaderValueTooLong { name: String, len: usize },

    #[error("unknown header value type: {0}")]
    UnknownHeaderType(u8),

    /// The header block ended in the middle of a header.
    #[error("truncated header block")]
    TruncatedHeaders,

    #[error("header {0} is not valid UTF-8")]
    InvalidUtf8(String),

    /// Input ended with a partial frame buffered.
    #[error("unexpected end of input with {0} bytes of a partial frame buffered")]
    UnexpectedEof(usize),
}

/// A frame lacks a header required to classify it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0} event header not present")]
pub struct MissingHeader(pub &'static str);
