//! Frame-level logging.

use eventstream_core::Frame;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    #[cfg(feature = "tracing")]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

#[cfg(feature = "tracing")]
pub(crate) fn log_frame(direction: Direction, frame: &Frame) {
    use base64::Engine;

    tracing::debug!(
        direction = direction.as_str(),
        headers = %frame.headers(),
        payload = %base64::engine::general_purpose::STANDARD.encode(frame.payload()),
        "event stream message"
    );
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn log_frame(_direction: Direction, _frame: &Frame) {}
