//! Typed frames for the vehicle-log feed protocol.
//!
//! The server pushes JSON text frames over the feed WebSocket. Three
//! message types exist today:
//!
//! ```json
//! {"type": "initial_data", "logs": [ ... ]}
//! {"type": "vehicle_log_message", "message_type": "new_log", "log": { ... }}
//! {"type": "pong", "timestamp": "..."}
//! ```
//!
//! Everything else decodes to [`InboundMessage::Unknown`] and is dropped
//! by the caller, so new server-side message types never break old clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── VehicleLog ───────────────────────────────────────────────────────

/// Direction of a gate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    Entry,
    Exit,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vehicle entry/exit occurrence delivered by the feed.
///
/// Records inside `initial_data` carry only the core fields;
/// `vehicle_make_model` and `organization` appear on live records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLog {
    /// Server-assigned log id. Unique on the server, but the feed does
    /// not deduplicate — a replayed id produces a second record.
    pub id: i64,

    /// License plate (falls back to VIN server-side when unplated).
    pub vehicle_plate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_make_model: Option<String>,

    pub action: LogAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Username of the guard or system that recorded the event.
    pub created_by: String,

    /// ISO-8601 timestamp from the server. Buffer order is arrival
    /// order, not timestamp order.
    pub timestamp: DateTime<Utc>,
}

// ── Raw frame envelope ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawFrame {
    #[serde(rename = "initial_data")]
    InitialData { logs: Vec<VehicleLog> },

    #[serde(rename = "vehicle_log_message")]
    VehicleLogMessage {
        message_type: String,
        #[serde(default)]
        log: Option<VehicleLog>,
    },

    #[serde(rename = "pong")]
    Pong {
        #[serde(default)]
        #[allow(dead_code)]
        timestamp: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

// ── InboundMessage ───────────────────────────────────────────────────

/// A decoded inbound frame, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Snapshot of the most recent logs, sent once per connection.
    InitialSnapshot(Vec<VehicleLog>),
    /// A single live log pushed as it happens.
    NewLog(VehicleLog),
    /// Reply to a client ping. Consumed purely for liveness.
    Heartbeat,
    /// Unrecognized `type` or `message_type` — dropped silently.
    Unknown,
}

impl InboundMessage {
    /// Decode a WebSocket text frame.
    ///
    /// Unknown message types decode to [`Self::Unknown`]; only malformed
    /// JSON (or a known type with a broken payload) is an error.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
            frame: truncate_frame(text),
        })?;

        Ok(match raw {
            RawFrame::InitialData { logs } => Self::InitialSnapshot(logs),
            RawFrame::VehicleLogMessage { message_type, log } => {
                match (message_type.as_str(), log) {
                    ("new_log", Some(log)) => Self::NewLog(log),
                    (other, _) => {
                        tracing::debug!(message_type = other, "unhandled vehicle_log_message");
                        Self::Unknown
                    }
                }
            }
            RawFrame::Pong { .. } => Self::Heartbeat,
            RawFrame::Unknown => Self::Unknown,
        })
    }
}

// ── OutboundMessage ──────────────────────────────────────────────────

/// Frames the client may send. Delivery is best-effort.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Liveness probe; the server answers with `pong`.
    Ping,
}

impl OutboundMessage {
    pub fn to_json(self) -> String {
        // A unit-like tagged variant cannot fail to serialize.
        serde_json::to_string(&self).unwrap_or_default()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Keep error payloads bounded when the server sends garbage.
fn truncate_frame(text: &str) -> String {
    const MAX: usize = 256;
    if text.len() <= MAX {
        text.to_owned()
    } else {
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

// ── Tests ────────────────────────────────────────────────────────────
