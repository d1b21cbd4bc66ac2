// gatewatch-api: Async WebSocket client for the fleet console vehicle-log feed.

pub mod error;
pub mod session;
pub mod wire;

pub use error::Error;
