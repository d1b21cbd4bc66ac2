// ── Feed controller ──
//
// Full lifecycle management for one live feed connection: credential
// resolution, session supervision, reconnect policy, and republishing
// state to consumers. All buffer mutations and state transitions happen
// on one supervisor task; consumers observe them through a single watch
// channel, so connection state and buffer contents always change
// together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gatewatch_api::session::{self, SessionEvent, TaggedEvent};
use gatewatch_api::wire::VehicleLog;

use crate::buffer::FeedBuffer;
use crate::config::FeedConfig;
use crate::error::CoreError;
use crate::notify::NotificationSink;
use crate::router::{MessageRouter, Routed};
use crate::stream::FeedStream;

const SESSION_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────────

/// Why the feed is disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No credential was available; no attempt was made and none will
    /// be until `connect()` is invoked again.
    AuthMissing,
    /// The connection failed or dropped; a reconnect is pending.
    TransportError,
    /// `close()` was called. Terminal.
    Closed,
}

/// Connection state observable by consumers. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. `reason: None` means `connect()` has not run yet.
    Disconnected { reason: Option<DisconnectReason> },
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Terminal state — a closed feed never transitions again.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            Self::Disconnected {
                reason: Some(DisconnectReason::Closed)
            }
        )
    }
}

// ── FeedSnapshot ─────────────────────────────────────────────────────

/// Atomic view republished to consumers on every change.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub connection: ConnectionState,
    /// Newest-first window of logs, at most the configured capacity.
    pub logs: Arc<Vec<Arc<VehicleLog>>>,
    /// When the last server heartbeat (pong) arrived.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    fn initial() -> Self {
        Self {
            connection: ConnectionState::Disconnected { reason: None },
            logs: Arc::new(Vec::new()),
            last_heartbeat: None,
        }
    }
}

// ── Credential port ──────────────────────────────────────────────────

/// Collaborator that supplies the bearer token for the feed endpoint.
///
/// Consulted at every connection attempt, so a refreshed token is
/// picked up on the next reconnect. An empty token counts as absent.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<SecretString>;
}

/// Fixed-token provider for CLIs and tests.
pub struct StaticTokenProvider(SecretString);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn from_secret(token: SecretString) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

fn resolve_token(provider: &dyn TokenProvider) -> Option<SecretString> {
    provider
        .access_token()
        .filter(|t| !t.expose_secret().is_empty())
}

// ── FeedController ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. Owns the connection lifecycle end to
/// end; consumers read through [`snapshot`](Self::snapshot) and
/// [`subscribe`](Self::subscribe). One controller instance per view —
/// pass it by reference, don't make it a global.
#[derive(Clone)]
pub struct FeedController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: FeedConfig,
    tokens: Arc<dyn TokenProvider>,
    sink: Arc<dyn NotificationSink>,
    state: watch::Sender<FeedSnapshot>,
    cancel: CancellationToken,
    /// Buffer and reducer state. Created once with the controller and
    /// shared across supervisor spawns, so the window survives a
    /// supervisor exit (retry cap, token loss) and a later `connect()`.
    /// Only the live supervisor holds the lock.
    core: Mutex<FeedCore>,
    /// Whether a supervisor task currently owns the feed. The
    /// supervisor releases this BEFORE its final state publish, so a
    /// caller that observes a give-up state and calls `connect()` is
    /// guaranteed a fresh spawn.
    running: AtomicBool,
}

impl FeedController {
    /// Create a controller. Does NOT connect — call
    /// [`connect()`](Self::connect) to start the feed.
    pub fn new(
        config: FeedConfig,
        tokens: Arc<dyn TokenProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (state, _) = watch::channel(FeedSnapshot::initial());
        let core = Mutex::new(FeedCore::new(config.capacity, Arc::clone(&sink)));

        Self {
            inner: Arc::new(ControllerInner {
                config,
                tokens,
                sink,
                state,
                cancel: CancellationToken::new(),
                core,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Access the feed configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Start the feed.
    ///
    /// Resolves the credential and spawns the supervisor task. With no
    /// credential available the state becomes
    /// `Disconnected(AuthMissing)` immediately — no attempt, no retry
    /// timer — and `connect()` may be invoked again once a token
    /// exists. Transport failures after this point are recovered
    /// internally and surface only through the connection state.
    pub fn connect(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Closed);
        }

        // Claim the supervisor slot.
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("connect() called while feed is already running");
            return Ok(());
        }

        if resolve_token(&*self.inner.tokens).is_none() {
            self.inner.running.store(false, Ordering::SeqCst);
            warn!("no access token available; feed not started");
            publish_connection(
                &self.inner,
                ConnectionState::Disconnected {
                    reason: Some(DisconnectReason::AuthMissing),
                },
            );
            return Err(CoreError::AuthMissing);
        }

        let _supervisor = tokio::spawn(supervise(Arc::clone(&self.inner)));
        Ok(())
    }

    /// Shut the feed down. Terminal: cancels the session and any
    /// pending reconnect, publishes `Disconnected(Closed)`, and
    /// guarantees no further transitions or buffer mutations — effects
    /// of callbacks from superseded attempts are discarded.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        publish_connection(
            &self.inner,
            ConnectionState::Disconnected {
                reason: Some(DisconnectReason::Closed),
            },
        );
        debug!("feed controller closed");
    }

    /// Opt into notifications. Distinct, consumer-invoked action — the
    /// controller never requests permission on its own.
    pub fn enable_notifications(&self) {
        self.inner.sink.request_permission();
    }

    // ── State observation ────────────────────────────────────────────

    /// Point-in-time view of connection state and buffer.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to feed updates: one delivery per state or buffer change.
    pub fn subscribe(&self) -> FeedStream {
        FeedStream::new(self.inner.state.subscribe())
    }
}

// ── Publishing ───────────────────────────────────────────────────────

/// Replace the published snapshot unless the feed is already closed.
/// The terminal `Closed` state is sticky by construction.
fn publish(inner: &ControllerInner, snap: FeedSnapshot) {
    inner.state.send_if_modified(|current| {
        if current.connection.is_closed() {
            return false;
        }
        *current = snap;
        true
    });
}

fn publish_connection(inner: &ControllerInner, connection: ConnectionState) {
    inner.state.send_if_modified(|current| {
        if current.connection.is_closed() || current.connection == connection {
            return false;
        }
        current.connection = connection;
        true
    });
}

// ── Supervisor ───────────────────────────────────────────────────────

/// What applying a session event did.
#[derive(Debug)]
enum Applied {
    /// Handshake completed; connection is live.
    Opened,
    /// State or buffer changed.
    Changed,
    /// Nothing to republish.
    Unchanged,
    /// Event from a superseded attempt — discarded.
    Stale,
    /// The live session ended; reconnect decision is the caller's.
    SessionEnded { error: Option<gatewatch_api::Error> },
}

/// Single-writer reducer over connection state and buffer.
///
/// Owned by the supervisor task; every mutation for one message is
/// applied here synchronously, then republished as one snapshot.
struct FeedCore {
    buffer: FeedBuffer,
    router: MessageRouter,
    connection: ConnectionState,
    last_heartbeat: Option<DateTime<Utc>>,
    generation: u64,
}

impl FeedCore {
    fn new(capacity: usize, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            buffer: FeedBuffer::new(capacity),
            router: MessageRouter::new(sink),
            connection: ConnectionState::Disconnected { reason: None },
            last_heartbeat: None,
            generation: 0,
        }
    }

    /// Enter a new connection attempt. Events tagged with any earlier
    /// generation become stale from here on.
    fn begin_attempt(&mut self, generation: u64) {
        self.generation = generation;
        self.connection = ConnectionState::Connecting;
    }

    fn apply(&mut self, tagged: TaggedEvent) -> Applied {
        if tagged.generation != self.generation {
            tracing::trace!(
                event_generation = tagged.generation,
                live_generation = self.generation,
                "discarding event from superseded attempt"
            );
            return Applied::Stale;
        }

        match tagged.event {
            SessionEvent::Opened => {
                self.connection = ConnectionState::Connected;
                Applied::Opened
            }
            SessionEvent::Message(msg) => match self.router.apply(&mut self.buffer, msg) {
                Routed::BufferChanged => Applied::Changed,
                Routed::Heartbeat => {
                    self.last_heartbeat = Some(Utc::now());
                    Applied::Changed
                }
                Routed::Ignored => Applied::Unchanged,
            },
            SessionEvent::Closed { error } => {
                self.connection = ConnectionState::Disconnected {
                    reason: Some(DisconnectReason::TransportError),
                };
                Applied::SessionEnded { error }
            }
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            connection: self.connection,
            logs: self.buffer.snapshot(),
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// Supervisor loop: resolve token → run one session → on failure,
/// back off → reconnect. Exactly one pending reconnect sleep can exist
/// at a time, and `close()` cancels it along with the live session.
///
/// The [`FeedCore`] lives in [`ControllerInner`]; this task holds its
/// lock for the whole run, so the buffer carries over when `connect()`
/// spawns a fresh supervisor after a give-up, and an exiting supervisor
/// finishes publishing before its successor starts.
async fn supervise(inner: Arc<ControllerInner>) {
    let mut core = inner.core.lock().await;
    let (events_tx, mut events_rx) = mpsc::channel::<TaggedEvent>(SESSION_CHANNEL_SIZE);
    let mut attempt: u32 = 0;

    loop {
        // Re-resolved every attempt so token refreshes are picked up.
        let Some(token) = resolve_token(&*inner.tokens) else {
            warn!("access token disappeared; feed stopping until connect() is re-invoked");
            core.connection = ConnectionState::Disconnected {
                reason: Some(DisconnectReason::AuthMissing),
            };
            // Release the slot before the final publish: anyone who
            // observes this state can connect() again immediately.
            inner.running.store(false, Ordering::SeqCst);
            publish(&inner, core.snapshot());
            return;
        };

        let generation = core.generation + 1;
        core.begin_attempt(generation);
        publish(&inner, core.snapshot());

        let url = session::feed_url(&inner.config.endpoint, token.expose_secret());
        let session_cancel = inner.cancel.child_token();
        let _session = session::spawn(
            url,
            generation,
            events_tx.clone(),
            session_cancel.clone(),
            inner.config.ping_interval,
        );

        // Pump events for this attempt until the session ends. The
        // end-of-session publish happens after the retry decision below
        // so the slot is already released when a give-up state lands.
        let ended = loop {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => {
                    inner.running.store(false, Ordering::SeqCst);
                    return;
                }
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        inner.running.store(false, Ordering::SeqCst);
                        return;
                    };
                    match core.apply(event) {
                        Applied::Opened => {
                            attempt = 0;
                            publish(&inner, core.snapshot());
                        }
                        Applied::Changed => publish(&inner, core.snapshot()),
                        Applied::Unchanged | Applied::Stale => {}
                        Applied::SessionEnded { error } => break error,
                    }
                }
            }
        };
        session_cancel.cancel();

        match ended {
            Some(e) => warn!(error = %e, attempt, "feed session ended"),
            None => info!("feed disconnected, reconnecting"),
        }

        if let Some(max) = inner.config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "reconnect limit reached, giving up");
                inner.running.store(false, Ordering::SeqCst);
                publish(&inner, core.snapshot());
                return;
            }
        }
        publish(&inner, core.snapshot());

        let delay = session::backoff_delay(attempt, &inner.config.reconnect);
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt, "waiting before reconnect");
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => {
                inner.running.store(false, Ordering::SeqCst);
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
