// ── Core error types ──
//
// User-facing errors from gatewatch-core. Transport and decode failures
// are recovered internally and never appear here — consumers only see
// the connection state. What remains is what a caller can actually act
// on: missing credentials and bad configuration.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No access token available — the feed was not started. Supply a
    /// credential and call `connect()` again.
    #[error("No access token available")]
    AuthMissing,

    /// The feed is closed; a closed controller never reconnects.
    #[error("Feed controller is closed")]
    Closed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}
