//! Terminal rendering for feed lines and connection banners.

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use gatewatch_core::{ConnectionState, DisconnectReason, LogAction, VehicleLog};

/// Render one feed line: direction marker, plate, who logged it, and a
/// relative timestamp.
pub fn render_log(log: &VehicleLog, now: DateTime<Utc>) -> String {
    let marker = match log.action {
        LogAction::Entry => format!("{}", "▶ IN ".green().bold()),
        LogAction::Exit => format!("{}", "◀ OUT".red().bold()),
    };

    let mut detail = String::new();
    if let Some(ref make_model) = log.vehicle_make_model {
        detail.push_str(&format!(" {}", make_model.dimmed()));
    }
    if let Some(ref organization) = log.organization {
        detail.push_str(&format!(" ({organization})"));
    }

    format!(
        "{marker} {}{} {} {}",
        log.vehicle_plate.bold(),
        detail,
        format!("by {}", log.created_by).dimmed(),
        time_ago(log.timestamp, now).dimmed(),
    )
}

/// Render a connection-state banner line.
pub fn render_state(state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => format!("{}", "● connected".green()),
        ConnectionState::Connecting => format!("{}", "◌ connecting...".yellow()),
        ConnectionState::Disconnected { reason } => {
            let detail = match reason {
                Some(DisconnectReason::AuthMissing) => "no token",
                Some(DisconnectReason::TransportError) => "connection lost, retrying",
                Some(DisconnectReason::Closed) => "closed",
                None => "not connected",
            };
            format!("{}", format!("○ disconnected ({detail})").red())
        }
    }
}

/// Humanized relative timestamp ("just now", "4m ago", "2h ago").
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "just now".into();
    }
    match secs {
        0..=59 => "just now".into(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// How many entries at the head of `current` are new relative to the
/// previously rendered window.
///
/// The previous head id anchors the comparison; if it is gone entirely
/// the whole window is fresh (reconnect snapshot).
pub fn fresh_entries(prev_head: Option<i64>, current: &[std::sync::Arc<VehicleLog>]) -> usize {
    match prev_head {
        None => current.len(),
        Some(head) => current
            .iter()
            .position(|l| l.id == head)
            .unwrap_or(current.len()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
