// ── Bounded newest-first feed buffer ──
//
// Holds the rolling window of vehicle logs the console displays.
// Order is arrival order, newest at the head; length never exceeds
// capacity. The buffer is owned by the controller's supervisor task,
// so no interior locking is needed.

use std::collections::VecDeque;
use std::sync::Arc;

use gatewatch_api::wire::VehicleLog;

/// Default window size — matches the 20 most-recent logs the server
/// sends in its initial snapshot.
pub const DEFAULT_CAPACITY: usize = 20;

/// Bounded, ordered, newest-first container of vehicle logs.
#[derive(Debug)]
pub struct FeedBuffer {
    logs: VecDeque<Arc<VehicleLog>>,
    capacity: usize,
    snapshot: Arc<Vec<Arc<VehicleLog>>>,
}

impl FeedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: VecDeque::with_capacity(capacity),
            capacity,
            snapshot: Arc::new(Vec::new()),
        }
    }

    /// Prepend a log; drop the tail if the window overflows.
    ///
    /// No id-based deduplication: a replayed id inserts a second entry.
    pub fn push_newest(&mut self, log: VehicleLog) {
        self.logs.push_front(Arc::new(log));
        self.logs.truncate(self.capacity);
        self.rebuild_snapshot();
    }

    /// Replace the whole window with the first `capacity` records of
    /// `logs`, preserving the given order.
    pub fn replace_all(&mut self, logs: Vec<VehicleLog>) {
        self.logs = logs
            .into_iter()
            .take(self.capacity)
            .map(Arc::new)
            .collect();
        self.rebuild_snapshot();
    }

    /// Current window as an immutable snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<VehicleLog>>> {
        Arc::clone(&self.snapshot)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rebuild the shared snapshot after a mutation. Readers holding an
    /// older snapshot keep a consistent view.
    fn rebuild_snapshot(&mut self) {
        self.snapshot = Arc::new(self.logs.iter().map(Arc::clone).collect());
    }
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
