// ── Reactive feed stream ──
//
// Subscription type for consuming feed updates from the controller.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::controller::FeedSnapshot;

/// A subscription to the feed.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via `changed()` or by converting to a `Stream`. Every
/// update carries connection state and buffer contents together, so an
/// observer can never see a connected state with a stale buffer.
pub struct FeedStream {
    current: FeedSnapshot,
    receiver: watch::Receiver<FeedSnapshot>,
}

impl FeedStream {
    pub(crate) fn new(receiver: watch::Receiver<FeedSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time.
    pub fn current(&self) -> &FeedSnapshot {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> FeedSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the controller has been dropped.
    pub async fn changed(&mut self) -> Option<FeedSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> FeedWatchStream {
        FeedWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by the controller's `watch` channel.
pub struct FeedWatchStream {
    inner: WatchStream<FeedSnapshot>,
}

impl Stream for FeedWatchStream {
    type Item = FeedSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
