//! Stream options.
//!
//! This module provides [`StreamOptions`] for configuring the writer and
//! reader halves of an event stream.

use eventstream_core::handshake_tags;

/// Which side of the initial handshake this endpoint plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamRole {
    /// Sends `initial-request`, expects `initial-response`.
    #[default]
    Client,
    /// Sends `initial-response`, expects `initial-request`.
    Server,
}

impl StreamRole {
    /// Handshake tag this endpoint writes.
    pub fn outbound_handshake_tag(self) -> &'static str {
        match self {
            StreamRole::Client => handshake_tags::INITIAL_REQUEST,
            StreamRole::Server => handshake_tags::INITIAL_RESPONSE,
        }
    }

    /// Handshake tag this endpoint reads.
    pub fn inbound_handshake_tag(self) -> &'static str {
        match self {
            StreamRole::Client => handshake_tags::INITIAL_RESPONSE,
            StreamRole::Server => handshake_tags::INITIAL_REQUEST,
        }
    }
}

/// Options shared by the writer and reader of an event stream.
///
/// # Example
///
/// ```ignore
/// use eventstream_client::StreamOptions;
///
/// let options = StreamOptions::new()
///     .supports_initial_handshake(true)
///     .log_reads(true);
/// ```
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub(crate) initial_handshake: bool,
    pub(crate) role: StreamRole,
    pub(crate) send_buffer: usize,
    pub(crate) feed_buffer: usize,
    pub(crate) log_writes: bool,
    pub(crate) log_reads: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            initial_handshake: false,
            role: StreamRole::Client,
            send_buffer: 1,
            feed_buffer: 1,
            log_writes: false,
            log_reads: false,
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the `initial-request`/`initial-response` exchange.
    pub fn supports_initial_handshake(mut self, enabled: bool) -> Self {
        self.initial_handshake = enabled;
        self
    }

    pub fn role(mut self, role: StreamRole) -> Self {
        self.role = role;
        self
    }

    /// Capacity of the hand-off between `send` callers and the writer task.
    ///
    /// Values below 1 are raised to 1.
    pub fn send_buffer(mut self, capacity: usize) -> Self {
        self.send_buffer = capacity.max(1);
        self
    }

    /// Capacity of the reader's main event feed.
    ///
    /// Values below 1 are raised to 1.
    pub fn feed_buffer(mut self, capacity: usize) -> Self {
        self.feed_buffer = capacity.max(1);
        self
    }

    /// Log every outbound frame (requires the `tracing` feature).
    pub fn log_writes(mut self, enabled: bool) -> Self {
        self.log_writes = enabled;
        self
    }

    /// Log every inbound frame (requires the `tracing` feature).
    pub fn log_reads(mut self, enabled: bool) -> Self {
        self.log_reads = enabled;
        self
    }

    pub fn get_initial_handshake(&self) -> bool {
        self.initial_handshake
    }

    pub fn get_role(&self) -> StreamRole {
        self.role
    }
}
