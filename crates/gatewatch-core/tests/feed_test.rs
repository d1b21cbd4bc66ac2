// End-to-end tests for the feed controller against a real in-process
// WebSocket server: connect, initial snapshot, live inserts, reconnect
// after a drop, and terminal close.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use gatewatch_api::session::ReconnectConfig;
use gatewatch_core::{
    ConnectionState, CoreError, DisconnectReason, FeedConfig, FeedController, FeedSnapshot,
    FeedStream, StaticTokenProvider, TracingSink,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

async fn bind() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url: Url = format!("ws://{addr}/ws/vehicle-logs/").parse().unwrap();
    (listener, url)
}

fn controller(endpoint: Url) -> FeedController {
    let mut config = FeedConfig::new(endpoint);
    config.ping_interval = None;
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(25),
        max_delay: Duration::from_millis(100),
        max_retries: None,
    };
    FeedController::new(
        config,
        Arc::new(StaticTokenProvider::new("integration-token")),
        Arc::new(TracingSink),
    )
}

/// Controller with retries capped at zero: the first session end stops
/// the supervisor, so restart behavior can be exercised directly.
fn capped_controller(endpoint: Url) -> FeedController {
    let mut config = FeedConfig::new(endpoint);
    config.ping_interval = None;
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        max_retries: Some(0),
    };
    FeedController::new(
        config,
        Arc::new(StaticTokenProvider::new("integration-token")),
        Arc::new(TracingSink),
    )
}

fn log_json(id: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "vehicle_plate": format!("PLT-{id:03}"),
        "action": if id % 2 == 0 { "EXIT" } else { "ENTRY" },
        "timestamp": "2026-03-01T08:00:00+00:00",
        "created_by": "guard1"
    })
}

fn initial_data_frame(ids: &[i64]) -> Message {
    let logs: Vec<_> = ids.iter().map(|id| log_json(*id)).collect();
    Message::Text(
        serde_json::json!({ "type": "initial_data", "logs": logs })
            .to_string()
            .into(),
    )
}

fn new_log_frame(id: i64) -> Message {
    Message::Text(
        serde_json::json!({
            "type": "vehicle_log_message",
            "message_type": "new_log",
            "log": log_json(id)
        })
        .to_string()
        .into(),
    )
}

fn ids(snap: &FeedSnapshot) -> Vec<i64> {
    snap.logs.iter().map(|l| l.id).collect()
}

async fn wait_for<F>(stream: &mut FeedStream, what: &str, pred: F) -> FeedSnapshot
where
    F: Fn(&FeedSnapshot) -> bool,
{
    let latest = stream.latest();
    if pred(&latest) {
        return latest;
    }
    loop {
        let snap = tokio::time::timeout(WAIT_TIMEOUT, stream.changed())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .expect("controller dropped");
        if pred(&snap) {
            return snap;
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_then_live_inserts_reach_subscribers() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[1, 2])).await.unwrap();
        ws.send(new_log_frame(3)).await.unwrap();
        // Hold the connection until the client goes away.
        while ws.next().await.is_some() {}
    });

    let controller = controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    let connected = wait_for(&mut stream, "connected state", |s| {
        s.connection.is_connected()
    })
    .await;
    assert!(connected.last_heartbeat.is_none());

    // Initial snapshot lands first, newest live insert goes on top.
    let snap = wait_for(&mut stream, "three logs", |s| s.logs.len() == 3).await;
    assert_eq!(ids(&snap), vec![3, 1, 2]);
    assert!(snap.connection.is_connected());

    controller.close();
    assert!(controller.snapshot().connection.is_closed());
    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_reconnects_and_replaces_window() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        // First connection: one log, then the server drops it.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[1])).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second connection: a fresh snapshot.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[2, 3])).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let controller = controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    // watch updates collapse, so don't insist on observing the [1]
    // window itself, just that logs have started flowing.
    wait_for(&mut stream, "first snapshot", |s| !s.logs.is_empty()).await;

    // The drop surfaces as a transport-level disconnect, then the
    // controller dials again and the new snapshot replaces the window.
    let snap = wait_for(&mut stream, "post-reconnect snapshot", |s| {
        ids(s) == vec![2, 3]
    })
    .await;
    assert!(snap.connection.is_connected());

    controller.close();
    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn close_discards_frames_already_in_flight() {
    let (listener, url) = bind().await;
    let (closed_tx, closed_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[1])).await.unwrap();

        // Wait for the test to close the controller, then push a frame
        // the client must ignore.
        closed_rx.await.unwrap();
        let _ = ws.send(new_log_frame(2)).await;
    });

    let controller = controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    wait_for(&mut stream, "initial snapshot", |s| ids(s) == vec![1]).await;

    controller.close();
    closed_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Terminal state, and the late frame never reached the buffer.
    let snap = controller.snapshot();
    assert_eq!(
        snap.connection,
        ConnectionState::Disconnected {
            reason: Some(DisconnectReason::Closed)
        }
    );
    assert_eq!(ids(&snap), vec![1]);

    assert!(matches!(controller.connect(), Err(CoreError::Closed)));
    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_endpoint_keeps_retrying_until_closed() {
    // Bind then drop the listener so every dial is refused.
    let (listener, url) = bind().await;
    drop(listener);

    let controller = controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    // Failure surfaces as a transport error while retries continue.
    wait_for(&mut stream, "transport-error state", |s| {
        s.connection
            == ConnectionState::Disconnected {
                reason: Some(DisconnectReason::TransportError),
            }
    })
    .await;

    // At least one more attempt follows the backoff.
    wait_for(&mut stream, "next attempt", |s| {
        s.connection == ConnectionState::Connecting
    })
    .await;

    controller.close();
    assert!(controller.snapshot().connection.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_limit_stops_dialing() {
    let (listener, url) = bind().await;
    drop(listener);

    let mut config = FeedConfig::new(url);
    config.ping_interval = None;
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        max_retries: Some(1),
    };
    let controller = FeedController::new(
        config,
        Arc::new(StaticTokenProvider::new("integration-token")),
        Arc::new(TracingSink),
    );

    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    wait_for(&mut stream, "give-up state", |s| {
        s.connection
            == ConnectionState::Disconnected {
                reason: Some(DisconnectReason::TransportError),
            }
    })
    .await;

    // Second attempt fails too; after that the supervisor must stop.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        controller.snapshot().connection,
        ConnectionState::Disconnected {
            reason: Some(DisconnectReason::TransportError)
        }
    );

    // With the supervisor gone, connect() may start the feed again.
    assert!(controller.connect().is_ok());
    controller.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn window_survives_connect_after_give_up() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        // First connection delivers one log and then drops.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[1])).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second connection, once the feed has been restarted by hand.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[2, 3])).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let controller = capped_controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    // Zero retries: the drop ends the supervisor outright.
    wait_for(&mut stream, "give-up state", |s| {
        s.connection
            == ConnectionState::Disconnected {
                reason: Some(DisconnectReason::TransportError),
            }
    })
    .await;

    // The window belongs to the controller, not the supervisor: it is
    // still readable after the give-up and carries into the restart.
    assert_eq!(ids(&controller.snapshot()), vec![1]);
    controller.connect().unwrap();

    let snap = wait_for(&mut stream, "post-restart snapshot", |s| ids(s) == vec![2, 3]).await;
    assert!(snap.connection.is_connected());

    controller.close();
    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_restarts_feed_right_after_give_up() {
    // Refuse the first dial entirely: bind, note the port, drop.
    let (listener, url) = bind().await;
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let controller = capped_controller(url);
    let mut stream = controller.subscribe();
    controller.connect().unwrap();

    wait_for(&mut stream, "give-up state", |s| {
        s.connection
            == ConnectionState::Disconnected {
                reason: Some(DisconnectReason::TransportError),
            }
    })
    .await;

    // Bring the endpoint up and restart with no settling delay:
    // observing the give-up state must be enough for connect() to
    // spawn a fresh supervisor, even if the old task has not fully
    // unwound yet.
    let listener = TcpListener::bind(addr).await.unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(initial_data_frame(&[7])).await.unwrap();
        while ws.next().await.is_some() {}
    });

    controller.connect().unwrap();
    let snap = wait_for(&mut stream, "restarted feed", |s| ids(s) == vec![7]).await;
    assert!(snap.connection.is_connected());

    controller.close();
    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_dials_stay_sequential() {
    let (listener, url) = bind().await;
    let accepts: Arc<std::sync::Mutex<Vec<Instant>>> = Arc::default();

    let record = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            record.lock().unwrap().push(Instant::now());
            // Complete the handshake, then drop the connection.
            drop(tokio_tungstenite::accept_async(stream).await);
        }
    });

    let mut config = FeedConfig::new(url);
    config.ping_interval = None;
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        max_retries: None,
    };
    let controller = FeedController::new(
        config,
        Arc::new(StaticTokenProvider::new("integration-token")),
        Arc::new(TracingSink),
    );
    controller.connect().unwrap();

    // Let a handful of attempts cycle, then stop everything.
    tokio::time::sleep(Duration::from_millis(650)).await;
    controller.close();
    server.abort();

    // Every dial must wait out the 100ms backoff from the previous
    // one: overlapping attempts or duplicate timers would show up as
    // near-simultaneous accepts. Load can only widen the gaps, so a
    // lower bound is safe to assert.
    let accepts = accepts.lock().unwrap();
    assert!(
        accepts.len() >= 2,
        "expected repeated dials, saw {}",
        accepts.len()
    );
    for pair in accepts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= Duration::from_millis(80),
            "dials only {gap:?} apart; attempts must be strictly sequential"
        );
    }
}
