// ── Runtime feed configuration ──
//
// Describes *how* to reach the feed endpoint and how the client should
// behave around it. Carries no credential data — tokens come through
// the TokenProvider port. The CLI constructs a `FeedConfig` and hands
// it in; core never reads config files.

use std::time::Duration;

use url::Url;

use gatewatch_api::session::ReconnectConfig;

use crate::buffer::DEFAULT_CAPACITY;

/// Configuration for one feed connection.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Feed endpoint (e.g., `wss://fleet.example.com/ws/vehicle-logs/`).
    /// The token is appended as a query parameter at connect time.
    pub endpoint: Url,

    /// Buffer capacity K. The view never holds more than this many logs.
    pub capacity: usize,

    /// Reconnection backoff policy.
    pub reconnect: ReconnectConfig,

    /// Keepalive ping interval. `None` disables client pings.
    pub ping_interval: Option<Duration>,
}

impl FeedConfig {
    /// Build a config with default tuning for the given endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            capacity: DEFAULT_CAPACITY,
            reconnect: ReconnectConfig::default(),
            ping_interval: Some(Duration::from_secs(30)),
        }
    }
}
