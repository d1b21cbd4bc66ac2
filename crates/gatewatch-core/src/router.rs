// ── Message routing ──
//
// Applies decoded feed messages to the buffer and fires the
// notification side channel. Pure dispatch: no I/O, no locking — the
// caller owns the buffer and serializes all mutations.

use std::sync::Arc;

use gatewatch_api::wire::{InboundMessage, VehicleLog};

use crate::buffer::FeedBuffer;
use crate::notify::NotificationSink;

/// What a dispatched message did, so the caller knows whether to
/// republish its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// The buffer was mutated.
    BufferChanged,
    /// Liveness signal only; no buffer mutation.
    Heartbeat,
    /// Dropped (unknown type) — nothing happened.
    Ignored,
}

/// Dispatches inbound messages to buffer mutations and notifications.
pub struct MessageRouter {
    sink: Arc<dyn NotificationSink>,
}

impl MessageRouter {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Apply one decoded message to the buffer.
    pub fn apply(&self, buffer: &mut FeedBuffer, msg: InboundMessage) -> Routed {
        match msg {
            InboundMessage::InitialSnapshot(logs) => {
                tracing::debug!(count = logs.len(), "applying initial snapshot");
                buffer.replace_all(logs);
                Routed::BufferChanged
            }
            InboundMessage::NewLog(log) => {
                if should_notify(&log) {
                    self.sink.notify(&log);
                }
                buffer.push_newest(log);
                Routed::BufferChanged
            }
            InboundMessage::Heartbeat => Routed::Heartbeat,
            InboundMessage::Unknown => Routed::Ignored,
        }
    }
}

/// Whether a live log should raise a notification.
///
/// Every entry/exit alerts today; this is the opt-out point for future
/// message kinds that should stay silent.
fn should_notify(log: &VehicleLog) -> bool {
    match log.action {
        gatewatch_api::wire::LogAction::Entry | gatewatch_api::wire::LogAction::Exit => true,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
