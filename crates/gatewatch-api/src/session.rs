//! Single-connection lifecycle for the vehicle-log feed.
//!
//! One [`spawn`]ed task owns exactly one WebSocket connection attempt:
//! it connects, decodes inbound frames, sends keepalive pings, and
//! reports everything to its owner over an mpsc channel. Every report
//! is tagged with the attempt's generation so the owner can discard
//! events from superseded attempts. Reconnection policy lives with the
//! owner — a session never retries on its own.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::wire::{InboundMessage, OutboundMessage};

// ── Session events ───────────────────────────────────────────────────

/// What a session reports back to its owner.
#[derive(Debug)]
pub enum SessionEvent {
    /// The WebSocket handshake completed.
    Opened,
    /// A decoded inbound frame.
    Message(InboundMessage),
    /// The connection ended. `error: None` means a clean close
    /// (server close frame or stream end); `Some` means failure.
    Closed { error: Option<Error> },
}

/// A [`SessionEvent`] tagged with the connection attempt that produced it.
///
/// The owner compares `generation` against its live attempt and drops
/// anything stale, so a superseded connection can never resurrect a
/// torn-down feed.
#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: SessionEvent,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for feed reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 3s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) ± 25%`
///
/// Jitter is deterministic per attempt number — enough to spread
/// reconnection storms, no RNG dependency needed.
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX).min(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 5.7).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── Endpoint construction ────────────────────────────────────────────

/// Build the connect URL: the feed endpoint with the bearer token
/// appended as a `token` query parameter, which is how the server
/// authenticates the upgrade request.
pub fn feed_url(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

// ── Session task ─────────────────────────────────────────────────────

/// Spawn a session task for one connection attempt.
///
/// The task reports through `events` until the connection ends, then
/// sends a final [`SessionEvent::Closed`] and exits. Cancel `cancel`
/// to tear the connection down early.
pub fn spawn(
    url: Url,
    generation: u64,
    events: mpsc::Sender<TaggedEvent>,
    cancel: CancellationToken,
    ping_interval: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let error = match connect_and_read(&url, generation, &events, &cancel, ping_interval).await
        {
            Ok(()) => None,
            Err(e) => Some(e),
        };

        let _ = events
            .send(TaggedEvent {
                generation,
                event: SessionEvent::Closed { error },
            })
            .await;
    })
}

/// Establish the WebSocket connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    generation: u64,
    events: &mpsc::Sender<TaggedEvent>,
    cancel: &CancellationToken,
    ping_interval: Option<Duration>,
) -> Result<(), Error> {
    // The URL carries the credential — log only where we are going.
    tracing::debug!(
        host = url.host_str().unwrap_or("<none>"),
        path = url.path(),
        generation,
        "connecting to feed"
    );

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Connect(e.to_string()))?;
    let request = ClientRequestBuilder::new(uri);

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    tracing::info!(generation, "feed connected");
    let _ = events
        .send(TaggedEvent {
            generation,
            event: SessionEvent::Opened,
        })
        .await;

    let (mut write, mut read) = ws_stream.split();

    // With no ping interval configured the timer still exists but its
    // branch is disabled below.
    let mut keepalive =
        tokio::time::interval(ping_interval.unwrap_or(Duration::from_secs(3600)));
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    keepalive.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),

            _ = keepalive.tick(), if ping_interval.is_some() => {
                write
                    .send(tungstenite::Message::Text(OutboundMessage::Ping.to_json().into()))
                    .await
                    .map_err(|e| Error::Send(e.to_string()))?;
                tracing::trace!(generation, "keepalive ping sent");
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match InboundMessage::parse(&text) {
                            Ok(msg) => {
                                let _ = events
                                    .send(TaggedEvent {
                                        generation,
                                        event: SessionEvent::Message(msg),
                                    })
                                    .await;
                            }
                            // Malformed frame: drop it, keep the connection.
                            Err(e) => {
                                tracing::debug!(error = %e, "dropping undecodable frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with pong automatically
                        tracing::trace!("transport ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "feed close frame");
                        } else {
                            tracing::info!("feed close frame (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::Stream(e.to_string()));
                    }
                    None => {
                        // Stream ended without a close frame
                        tracing::info!("feed stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame — ignore
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
