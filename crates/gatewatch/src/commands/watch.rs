//! The `watch` command: tail the live feed to the terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use owo_colors::OwoColorize;

use gatewatch_core::{
    FeedController, NotificationSink, StaticTokenProvider, VehicleLog,
};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Notification sink for the terminal: rings the bell for new logs once
/// the user has opted in with `--notify`.
#[derive(Default)]
struct TerminalSink {
    enabled: AtomicBool,
}

impl NotificationSink for TerminalSink {
    fn request_permission(&self) {
        if !self.enabled.swap(true, Ordering::Relaxed) {
            eprintln!("{}", "notifications enabled (terminal bell)".dimmed());
        }
    }

    fn notify(&self, _log: &VehicleLog) {
        if self.enabled.load(Ordering::Relaxed) {
            // BEL; the feed line itself is printed by the watch loop.
            eprint!("\x07");
        }
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let feed_config = config::resolve_feed_config(global, args.capacity)?;
    let token = config::resolve_token(global)?;
    tracing::debug!(
        endpoint = %feed_config.endpoint,
        capacity = feed_config.capacity,
        "starting watch"
    );

    let controller = FeedController::new(
        feed_config,
        Arc::new(StaticTokenProvider::from_secret(token)),
        Arc::new(TerminalSink::default()),
    );

    let mut stream = controller.subscribe();
    if args.notify {
        controller.enable_notifications();
    }
    controller.connect()?;

    let mut last_state = stream.current().connection;
    let mut prev_head: Option<i64> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snap = stream.changed() => {
                let Some(snap) = snap else { break };

                if snap.connection != last_state {
                    println!("{}", output::render_state(snap.connection));
                    last_state = snap.connection;
                }

                // Print new head entries oldest-first so the newest log
                // always ends up at the bottom of the terminal.
                let now = Utc::now();
                let fresh = output::fresh_entries(prev_head, &snap.logs);
                for log in snap.logs.iter().take(fresh).rev() {
                    println!("{}", output::render_log(log, now));
                }
                prev_head = snap.logs.first().map(|l| l.id);
            }
        }
    }

    controller.close();
    println!("{}", output::render_state(controller.snapshot().connection));
    Ok(())
}
