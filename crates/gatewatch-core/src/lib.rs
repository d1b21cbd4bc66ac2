// gatewatch-core: Live feed state between gatewatch-api and consumers (CLI).

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod router;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use buffer::FeedBuffer;
pub use config::FeedConfig;
pub use controller::{
    ConnectionState, DisconnectReason, FeedController, FeedSnapshot, StaticTokenProvider,
    TokenProvider,
};
pub use error::CoreError;
pub use notify::{NotificationSink, TracingSink};
pub use stream::FeedStream;

// Re-export the wire model at the crate root for ergonomics.
pub use gatewatch_api::wire::{InboundMessage, LogAction, VehicleLog};
