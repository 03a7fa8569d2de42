//! Configuration for event streams.
//!
//! - [`StreamOptions`]: Handshake toggle, role, buffer sizes and frame logging
//! - [`StreamRole`]: Which side of the handshake this endpoint plays

mod options;

pub use options::{StreamOptions, StreamRole};
