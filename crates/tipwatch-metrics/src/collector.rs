//! Collector — the background loop that polls the node.
//!
//! One cycle runs per interval tick. The tip fetch is mandatory: its
//! failure marks the snapshot unhealthy and ends the cycle. The network
//! fetch is best-effort: its failure is counted and the cycle goes on with
//! sync progress and connections left at their previous values.
//!
//! Every upstream call races the shutdown signal, so a stop interrupts a
//! slow fetch immediately. Store writes are never raced, so a write that
//! has begun always completes before [`Collector::run`] returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tipwatch_client::NodeApi;
use tipwatch_core::{MAX_DURATION, epoch_secs};

use crate::sink::MetricsSink;
use crate::store::SnapshotStore;

/// Error counter label for a failed tip fetch.
pub const TIP_FETCH_ERROR: &str = "tip_fetch_error";
/// Error counter label for a failed network fetch.
pub const NETWORK_FETCH_ERROR: &str = "network_fetch_error";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Tip and network fetched; full snapshot written.
    Collected,
    /// Tip fetched, network fetch failed; snapshot written without
    /// recomputing sync progress or connections.
    Degraded,
    /// Tip fetch failed; only the health flag was written.
    TipFailed,
    /// Shutdown arrived while an upstream call was in flight.
    Cancelled,
}

/// Polls a node and publishes snapshots.
pub struct Collector<C> {
    client: C,
    store: SnapshotStore,
    sink: Arc<dyn MetricsSink>,
    node_id: String,
    interval: Duration,
    request_timeout: Duration,
    /// Process start, for uptime.
    started_at: std::time::Instant,
}

impl<C: NodeApi> Collector<C> {
    /// Create a collector. Uptime is measured from this call.
    pub fn new(
        client: C,
        store: SnapshotStore,
        sink: Arc<dyn MetricsSink>,
        node_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            store,
            sink,
            node_id: node_id.into(),
            interval,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            started_at: std::time::Instant::now(),
        }
    }

    /// Bound each upstream call by `timeout`, capped at [`MAX_DURATION`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.min(MAX_DURATION);
        self
    }

    /// Measure uptime from `started_at` (usually process start) instead of
    /// construction time.
    pub fn with_start_time(mut self, started_at: std::time::Instant) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run cycles until the shutdown signal changes or its sender is dropped.
    ///
    /// The first cycle starts immediately; later ones follow the interval.
    /// A cycle that overruns delays the next tick instead of bursting.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            node_id = %self.node_id,
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.request_timeout.as_millis() as u64,
            "collector started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if self.collect_once(&mut shutdown).await == CycleOutcome::Cancelled {
                        debug!(node_id = %self.node_id, "cycle cancelled by shutdown");
                        break;
                    }
                }
            }
        }

        info!(node_id = %self.node_id, "collector shutting down");
    }

    /// Run one collection cycle.
    pub async fn collect_once(&self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        let started = Instant::now();

        let tip = match cancellable(shutdown, self.client.fetch_tip(self.deadline())).await {
            None => return CycleOutcome::Cancelled,
            Some(Ok(tip)) => tip,
            Some(Err(e)) => {
                self.store.set_healthy(false).await;
                self.sink.record_error(&self.node_id, TIP_FETCH_ERROR);
                warn!(node_id = %self.node_id, kind = e.kind(), error = %e, "tip fetch failed");
                return CycleOutcome::TipFailed;
            }
        };

        let network = match cancellable(shutdown, self.client.fetch_network(self.deadline())).await
        {
            None => return CycleOutcome::Cancelled,
            Some(Ok(network)) => Some(network),
            Some(Err(e)) => {
                self.sink.record_error(&self.node_id, NETWORK_FETCH_ERROR);
                warn!(node_id = %self.node_id, kind = e.kind(), error = %e, "network fetch failed");
                None
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        // Sole writer: the stored copy carries the previous sync progress
        // and connection count forward when network info is missing.
        let mut next = self.store.read().await;
        next.node_id.clone_from(&self.node_id);
        next.block_height = tip.block_no;
        next.updated_at = epoch_secs();
        next.healthy = true;
        next.uptime_secs = self.started_at.elapsed().as_secs();
        next.latency_ms = latency_ms;
        if let Some(network) = &network {
            next.sync_progress =
                sync_progress(network.local_tip.block_no, network.network_tip.block_no);
            next.connections = placeholder_connections();
        }

        self.store.write(next.clone()).await;

        if let Err(e) = self.sink.record(&next) {
            warn!(node_id = %self.node_id, error = %e, "metrics sink rejected snapshot");
        }

        debug!(
            node_id = %self.node_id,
            block = tip.block_no,
            sync = next.sync_progress,
            latency_ms,
            "collected metrics"
        );

        if network.is_some() {
            CycleOutcome::Collected
        } else {
            CycleOutcome::Degraded
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }
}

/// Await `fut` unless the shutdown signal changes first.
async fn cancellable<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.changed() => None,
        out = fut => Some(out),
    }
}

/// Local height as a percentage of network height, clamped to `[0, 100]`.
///
/// Zero when either height is zero.
pub fn sync_progress(local_height: u64, network_height: u64) -> f64 {
    if local_height == 0 || network_height == 0 {
        return 0.0;
    }
    (local_height as f64 / network_height as f64 * 100.0).min(100.0)
}

/// Placeholder connection count.
///
/// The node's REST API exposes no peer count, so this is a stand-in in
/// `8..=12` that varies with wall-clock seconds. It is not a measurement.
pub fn placeholder_connections() -> u32 {
    8 + (epoch_secs() % 5) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Notify;

    use tipwatch_client::{ClientError, ClientResult};
    use tipwatch_core::{MetricsSnapshot, NetworkInfo, TipInfo};

    const NODE: &str = "relay-1";

    fn tip(block_no: u64) -> TipInfo {
        TipInfo {
            block_no,
            slot_no: block_no * 20,
            hash: format!("{block_no:064x}"),
            epoch: 500,
        }
    }

    fn network(local: u64, remote: u64) -> NetworkInfo {
        NetworkInfo {
            local_tip: tip(local),
            network_tip: tip(remote),
            node_era: "Conway".to_string(),
            sync_progress: None,
        }
    }

    /// Scripted upstream.
    struct FakeNode {
        tip: Mutex<ClientResult<TipInfo>>,
        network: Mutex<ClientResult<NetworkInfo>>,
        hang_tip: bool,
        hang_network: bool,
        tip_calls: AtomicU32,
        network_entered: Notify,
    }

    impl FakeNode {
        fn new(tip: ClientResult<TipInfo>, network: ClientResult<NetworkInfo>) -> Self {
            Self {
                tip: Mutex::new(tip),
                network: Mutex::new(network),
                hang_tip: false,
                hang_network: false,
                tip_calls: AtomicU32::new(0),
                network_entered: Notify::new(),
            }
        }

        fn set_tip(&self, tip: ClientResult<TipInfo>) {
            *self.tip.lock().unwrap() = tip;
        }

        fn set_network(&self, network: ClientResult<NetworkInfo>) {
            *self.network.lock().unwrap() = network;
        }
    }

    impl NodeApi for FakeNode {
        async fn fetch_tip(&self, _deadline: Instant) -> ClientResult<TipInfo> {
            self.tip_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_tip {
                std::future::pending::<()>().await;
            }
            let result = self.tip.lock().unwrap().clone();
            result
        }

        async fn fetch_network(&self, _deadline: Instant) -> ClientResult<NetworkInfo> {
            self.network_entered.notify_one();
            if self.hang_network {
                std::future::pending::<()>().await;
            }
            let result = self.network.lock().unwrap().clone();
            result
        }
    }

    /// Sink that remembers every call.
    #[derive(Default)]
    struct RecordingSink {
        snapshots: Mutex<Vec<MetricsSnapshot>>,
        errors: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn records(&self) -> usize {
            self.snapshots.lock().unwrap().len()
        }

        fn error_count(&self, error_type: &str) -> usize {
            self.errors
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, t)| t == error_type)
                .count()
        }
    }

    impl MetricsSink for RecordingSink {
        fn record(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
            self.snapshots.lock().unwrap().push(snapshot.clone());
            if self.fail {
                anyhow::bail!("exporter unavailable");
            }
            Ok(())
        }

        fn record_error(&self, node_id: &str, error_type: &str) {
            self.errors
                .lock()
                .unwrap()
                .push((node_id.to_string(), error_type.to_string()));
        }
    }

    fn collector(
        node: Arc<FakeNode>,
        sink: Arc<RecordingSink>,
        interval: Duration,
    ) -> Collector<Arc<FakeNode>> {
        Collector::new(node, SnapshotStore::new(NODE), sink, NODE, interval)
            .with_request_timeout(Duration::from_secs(1))
    }

    #[test]
    fn sync_progress_examples() {
        assert_eq!(sync_progress(900, 1000), 90.0);
        assert_eq!(sync_progress(1000, 1000), 100.0);
        assert_eq!(sync_progress(900, 0), 0.0);
        assert_eq!(sync_progress(0, 1000), 0.0);
    }

    #[test]
    fn sync_progress_clamps_when_local_is_ahead() {
        assert_eq!(sync_progress(1001, 1000), 100.0);
        assert_eq!(sync_progress(u64::MAX, 1), 100.0);
    }

    #[test]
    fn sync_progress_always_in_range() {
        let heights = [0u64, 1, 2, 7, 999, 1000, 1001, 10_500_000, u64::MAX / 2, u64::MAX];
        for &local in &heights {
            for &remote in &heights {
                let p = sync_progress(local, remote);
                assert!((0.0..=100.0).contains(&p), "{local}/{remote} gave {p}");
                if local == 0 || remote == 0 {
                    assert_eq!(p, 0.0);
                }
            }
        }
    }

    #[test]
    fn placeholder_connections_in_range() {
        let c = placeholder_connections();
        assert!((8..=12).contains(&c));
    }

    #[tokio::test]
    async fn successful_cycle_writes_full_snapshot() {
        let node = Arc::new(FakeNode::new(Ok(tip(900)), Ok(network(900, 1000))));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node, sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(collector.collect_once(&mut rx).await, CycleOutcome::Collected);

        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.node_id, NODE);
        assert_eq!(snap.block_height, 900);
        assert_eq!(snap.sync_progress, 90.0);
        assert!((8..=12).contains(&snap.connections));
        assert!(snap.updated_at > 0);
        assert!(snap.latency_ms >= 0.0);

        // The sink gets exactly the stored snapshot.
        assert_eq!(sink.records(), 1);
        assert_eq!(sink.snapshots.lock().unwrap()[0], snap);
    }

    #[tokio::test]
    async fn tip_failure_flips_health_and_keeps_numbers() {
        let node = Arc::new(FakeNode::new(Ok(tip(900)), Ok(network(900, 1000))));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node.clone(), sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;
        let before = collector.store().read().await;

        node.set_tip(Err(ClientError::Timeout));
        assert_eq!(collector.collect_once(&mut rx).await, CycleOutcome::TipFailed);

        let after = collector.store().read().await;
        assert!(!after.healthy);
        assert_eq!(after.block_height, before.block_height);
        assert_eq!(after.sync_progress, before.sync_progress);
        assert_eq!(after.connections, before.connections);
        assert_eq!(after.updated_at, before.updated_at);

        assert_eq!(sink.error_count(TIP_FETCH_ERROR), 1);
        assert_eq!(sink.error_count(NETWORK_FETCH_ERROR), 0);
        // No snapshot is forwarded for a failed cycle.
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn tip_failure_before_first_success_stays_unhealthy() {
        let node = Arc::new(FakeNode::new(
            Err(ClientError::Network("connection refused".into())),
            Ok(network(1, 1)),
        ));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node, sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;
        assert_eq!(collector.store().read().await, MetricsSnapshot::initial(NODE));
        assert_eq!(sink.error_count(TIP_FETCH_ERROR), 1);
    }

    #[tokio::test]
    async fn network_failure_keeps_health_and_previous_sync() {
        let node = Arc::new(FakeNode::new(Ok(tip(900)), Ok(network(900, 1000))));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node.clone(), sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;
        let before = collector.store().read().await;

        node.set_tip(Ok(tip(950)));
        node.set_network(Err(ClientError::BadStatus(500)));
        assert_eq!(collector.collect_once(&mut rx).await, CycleOutcome::Degraded);

        let after = collector.store().read().await;
        assert!(after.healthy);
        assert_eq!(after.block_height, 950);
        assert_eq!(after.sync_progress, before.sync_progress);
        assert_eq!(after.connections, before.connections);

        assert_eq!(sink.error_count(NETWORK_FETCH_ERROR), 1);
        assert_eq!(sink.error_count(TIP_FETCH_ERROR), 0);
        assert_eq!(sink.records(), 2);
    }

    #[tokio::test]
    async fn network_failure_on_first_cycle_leaves_defaults() {
        let node = Arc::new(FakeNode::new(
            Ok(tip(42)),
            Err(ClientError::Decode("expected value".into())),
        ));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node, sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;

        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.block_height, 42);
        assert_eq!(snap.sync_progress, 0.0);
        assert_eq!(snap.connections, 0);
    }

    #[tokio::test]
    async fn recovery_after_tip_failure_restores_health() {
        let node = Arc::new(FakeNode::new(Err(ClientError::Timeout), Ok(network(10, 10))));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node.clone(), sink, Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;
        assert!(!collector.store().read().await.healthy);

        node.set_tip(Ok(tip(10)));
        collector.collect_once(&mut rx).await;
        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.sync_progress, 100.0);
    }

    #[tokio::test]
    async fn sink_failure_does_not_affect_health() {
        let node = Arc::new(FakeNode::new(Ok(tip(5)), Ok(network(5, 10))));
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let collector = collector(node, sink.clone(), Duration::from_secs(30));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(collector.collect_once(&mut rx).await, CycleOutcome::Collected);
        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.sync_progress, 50.0);
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn uptime_counts_from_start_time() {
        let node = Arc::new(FakeNode::new(Ok(tip(1)), Ok(network(1, 1))));
        let sink = Arc::new(RecordingSink::default());
        let started = std::time::Instant::now() - Duration::from_secs(120);
        let collector = collector(node, sink, Duration::from_secs(30)).with_start_time(started);
        let (_tx, mut rx) = watch::channel(false);

        collector.collect_once(&mut rx).await;
        assert!(collector.store().read().await.uptime_secs >= 120);
    }

    #[tokio::test]
    async fn shutdown_during_network_fetch_abandons_cycle() {
        let mut fake = FakeNode::new(Ok(tip(900)), Ok(network(900, 1000)));
        fake.hang_network = true;
        let node = Arc::new(fake);
        let sink = Arc::new(RecordingSink::default());
        let collector = Arc::new(collector(node.clone(), sink.clone(), Duration::from_millis(10)));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let collector = collector.clone();
            tokio::spawn(async move { collector.run(rx).await })
        };

        node.network_entered.notified().await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector should stop promptly")
            .unwrap();

        // The interrupted cycle never reached the write, and no new cycle started.
        assert_eq!(node.tip_calls.load(Ordering::SeqCst), 1);
        assert_eq!(collector.store().read().await, MetricsSnapshot::initial(NODE));
        assert_eq!(sink.records(), 0);
    }

    /// Sink that raises the shutdown signal while recording.
    struct StopOnRecord {
        inner: RecordingSink,
        stop: watch::Sender<bool>,
    }

    impl MetricsSink for StopOnRecord {
        fn record(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
            self.stop.send_replace(true);
            self.inner.record(snapshot)
        }

        fn record_error(&self, node_id: &str, error_type: &str) {
            self.inner.record_error(node_id, error_type);
        }
    }

    #[tokio::test]
    async fn shutdown_after_write_keeps_completed_snapshot() {
        let node = Arc::new(FakeNode::new(Ok(tip(900)), Ok(network(900, 1000))));
        let (tx, rx) = watch::channel(false);
        let sink = Arc::new(StopOnRecord {
            inner: RecordingSink::default(),
            stop: tx,
        });
        let collector = Collector::new(
            node.clone(),
            SnapshotStore::new(NODE),
            sink.clone(),
            NODE,
            Duration::from_millis(10),
        );

        tokio::time::timeout(Duration::from_secs(1), collector.run(rx))
            .await
            .expect("collector should stop after the cycle");

        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.block_height, 900);
        assert_eq!(snap.sync_progress, 90.0);
        assert_eq!(sink.inner.records(), 1);
        assert_eq!(sink.inner.snapshots.lock().unwrap()[0], snap);

        // The signal arrived mid-cycle; no further cycle ran.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.tip_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_timeout_is_capped() {
        let node = Arc::new(FakeNode::new(Ok(tip(1)), Ok(network(1, 1))));
        let collector = collector(node, Arc::new(RecordingSink::default()), Duration::from_secs(30))
            .with_request_timeout(Duration::MAX);
        assert_eq!(collector.request_timeout, MAX_DURATION);
        assert!(collector.deadline() > Instant::now());
    }

    #[tokio::test]
    async fn shutdown_during_tip_fetch_returns_promptly() {
        let mut fake = FakeNode::new(Ok(tip(900)), Ok(network(900, 1000)));
        fake.hang_tip = true;
        let node = Arc::new(fake);
        let sink = Arc::new(RecordingSink::default());
        let collector = Arc::new(collector(node.clone(), sink.clone(), Duration::from_millis(10)));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let collector = collector.clone();
            tokio::spawn(async move { collector.run(rx).await })
        };

        while node.tip_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector should stop promptly")
            .unwrap();
        assert_eq!(node.tip_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.error_count(TIP_FETCH_ERROR), 0);
    }

    #[tokio::test]
    async fn run_collects_on_interval_until_shutdown() {
        let node = Arc::new(FakeNode::new(Ok(tip(100)), Ok(network(100, 200))));
        let sink = Arc::new(RecordingSink::default());
        let collector = Arc::new(collector(node.clone(), sink.clone(), Duration::from_millis(10)));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let collector = collector.clone();
            tokio::spawn(async move { collector.run(rx).await })
        };

        while sink.records() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        let calls = node.tip_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.tip_calls.load(Ordering::SeqCst), calls, "no cycle after shutdown");

        let snap = collector.store().read().await;
        assert!(snap.healthy);
        assert_eq!(snap.sync_progress, 50.0);
    }

    #[tokio::test]
    async fn run_exits_when_signal_already_set() {
        let node = Arc::new(FakeNode::new(Ok(tip(1)), Ok(network(1, 1))));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(node.clone(), sink, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), collector.run(rx))
            .await
            .expect("run should return immediately");
        assert_eq!(node.tip_calls.load(Ordering::SeqCst), 0);
    }
}
