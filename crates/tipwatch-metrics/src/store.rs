//! Single-slot snapshot store shared between the collector and readers.

use std::sync::Arc;

use tokio::sync::RwLock;

use tipwatch_core::MetricsSnapshot;

/// Holds the current [`MetricsSnapshot`].
///
/// Writers replace the whole value under the write lock, readers get an
/// owned clone under the read lock, so a reader never sees fields from two
/// different cycles. Cloning the store shares the same slot.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<RwLock<MetricsSnapshot>>,
}

impl SnapshotStore {
    /// Create a store holding the initial (zeroed, unhealthy) snapshot.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsSnapshot::initial(node_id))),
        }
    }

    /// Copy of the current snapshot.
    pub async fn read(&self) -> MetricsSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the current snapshot.
    pub async fn write(&self, snapshot: MetricsSnapshot) {
        *self.inner.write().await = snapshot;
    }

    /// Update only the health flag, leaving the numeric fields as they are.
    pub async fn set_healthy(&self, healthy: bool) {
        self.inner.write().await.healthy = healthy;
    }
}
