//! Wire primitives for the event-stream transport.
//!
//! This crate provides the runtime-independent pieces shared by every
//! event-stream reader and writer:
//!
//! ## Modules
//!
//! - [`header`]: Typed header values, header sets and reserved names
//! - [`frame`]: Binary frame encoding/decoding with CRC32 checksums
//! - [`classify`]: Mapping of discriminator headers to message categories
//! - [`error`]: Frame and classification error types

mod classify;
mod error;
mod frame;
mod header;

pub use classify::*;
pub use error::*;
pub use frame::*;
pub use header::*;
