use thiserror::Error;

/// Top-level error type for the `gatewatch-api` crate.
///
/// Covers the transport failure modes of the feed WebSocket.
/// `gatewatch-core` recovers from all of these locally — they are
/// reported through the connection state, never surfaced to consumers
/// as hard failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// The connection dropped mid-stream with a protocol or I/O error.
    #[error("WebSocket stream error: {0}")]
    Stream(String),

    /// An outbound frame could not be written.
    #[error("WebSocket send failed: {0}")]
    Send(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the offending frame for debugging.
    #[error("Frame decode error: {message}")]
    Decode { message: String, frame: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Stream(_) | Self::Send(_))
    }
}
