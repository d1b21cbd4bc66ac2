// ── Notification port ──
//
// Side channel for user-visible alerts on new feed entries. The
// controller only ever calls `request_permission` when the consumer
// explicitly asks for it — never implicitly.

use gatewatch_api::wire::VehicleLog;

/// Collaborator that surfaces feed entries to the user outside the
/// normal rendering path (desktop notification, terminal bell, ...).
pub trait NotificationSink: Send + Sync {
    /// Ask the user to allow notifications. Explicit and UI-triggered;
    /// implementations should be a no-op if permission is already held.
    fn request_permission(&self);

    /// Fire a user-visible alert for a newly arrived log.
    fn notify(&self, log: &VehicleLog);
}

/// Sink that forwards alerts to the tracing pipeline.
///
/// The default for headless consumers — alerts land in the log stream
/// instead of vanishing.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn request_permission(&self) {
        tracing::debug!("notification permission requested (tracing sink always allows)");
    }

    fn notify(&self, log: &VehicleLog) {
        tracing::info!(
            plate = %log.vehicle_plate,
            action = %log.action,
            created_by = %log.created_by,
            "vehicle log"
        );
    }
}
