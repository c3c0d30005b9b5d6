// Snapshot store: one current snapshot, swapped atomically.

use crate::models::MetricsSnapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holds the published snapshot. `publish` is an O(1) pointer swap; readers get an
/// `Arc` to an immutable snapshot and never block on, or observe half of, a publish.
pub struct SnapshotStore {
    current: ArcSwap<MetricsSnapshot>,
}

impl SnapshotStore {
    pub fn new(initial: MetricsSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Replace the current snapshot. Only the scheduler calls this.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// Latest published snapshot. Never samples, never fails.
    pub fn read(&self) -> Arc<MetricsSnapshot> {
        self.current.load_full()
    }
}
