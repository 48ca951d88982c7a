//! Metrics sink — where the collector forwards each snapshot.

use tipwatch_core::MetricsSnapshot;

/// Receives snapshots and error events from the collector.
///
/// Calls are fire-and-forget from the collector's point of view: a failed
/// `record` is logged and otherwise ignored.
pub trait MetricsSink: Send + Sync {
    /// Record a full snapshot. Called once per successful cycle.
    fn record(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()>;

    /// Count one failure of the given type (`tip_fetch_error`, ...).
    fn record_error(&self, node_id: &str, error_type: &str);
}
