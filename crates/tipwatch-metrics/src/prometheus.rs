//! Prometheus text exposition.
//!
//! [`PrometheusSink`] keeps the latest gauge values, a response-time
//! histogram, and error counters per node, and renders them in the
//! Prometheus text exposition format for the `/metrics` endpoint.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use anyhow::anyhow;

use tipwatch_core::MetricsSnapshot;

use crate::sink::MetricsSink;

/// Upper bounds (seconds) of the response-time histogram buckets.
const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Cumulative histogram of observed response times.
#[derive(Debug, Clone, Default)]
struct Histogram {
    /// Cumulative count per bucket in `LATENCY_BUCKETS` order.
    buckets: [u64; LATENCY_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (bound, bucket) in LATENCY_BUCKETS.iter().zip(self.buckets.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// Latest exported values for one node.
#[derive(Debug, Clone, Default)]
struct NodeSeries {
    block_height: u64,
    sync_progress: f64,
    connections: u32,
    uptime_secs: u64,
    response_time: Histogram,
}

#[derive(Debug, Default)]
struct ExporterState {
    nodes: BTreeMap<String, NodeSeries>,
    /// (node_id, error_type) → count.
    errors: BTreeMap<(String, String), u64>,
}

/// Sink that exports snapshots as Prometheus series.
#[derive(Debug, Default)]
pub struct PrometheusSink {
    state: Mutex<ExporterState>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the error counter for a node and error type.
    pub fn error_count(&self, node_id: &str, error_type: &str) -> u64 {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .errors
            .get(&(node_id.to_string(), error_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Render all series in the Prometheus text format.
    pub fn render(&self) -> String {
        match self.state.lock() {
            Ok(state) => render_prometheus(&state),
            Err(poisoned) => render_prometheus(&poisoned.into_inner()),
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn record(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("prometheus exporter state poisoned"))?;
        let series = state.nodes.entry(snapshot.node_id.clone()).or_default();
        series.block_height = snapshot.block_height;
        series.sync_progress = snapshot.sync_progress;
        series.connections = snapshot.connections;
        series.uptime_secs = snapshot.uptime_secs;
        series.response_time.observe(snapshot.latency_ms / 1000.0);
        Ok(())
    }

    fn record_error(&self, node_id: &str, error_type: &str) {
        // Counters stay consistent even if a holder panicked.
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state
            .errors
            .entry((node_id.to_string(), error_type.to_string()))
            .or_insert(0) += 1;
    }
}

fn render_prometheus(state: &ExporterState) -> String {
    let mut out = String::new();

    let gauges: [(&str, &str, fn(&NodeSeries) -> String); 4] = [
        (
            "cardano_node_block_height",
            "Current block height of the Cardano node",
            |s| s.block_height.to_string(),
        ),
        (
            "cardano_node_sync_progress",
            "Sync progress percentage of the Cardano node",
            |s| s.sync_progress.to_string(),
        ),
        (
            "cardano_node_connections",
            "Number of peer connections",
            |s| s.connections.to_string(),
        ),
        (
            "cardano_node_uptime_seconds",
            "Node uptime in seconds",
            |s| s.uptime_secs.to_string(),
        ),
    ];

    for (name, help, value) in gauges {
        let _ = writeln!(out, "# HELP {name} {help}.");
        let _ = writeln!(out, "# TYPE {name} gauge");
        for (node_id, series) in &state.nodes {
            let _ = writeln!(
                out,
                "{name}{{node_id=\"{}\"}} {}",
                escape_label(node_id),
                value(series)
            );
        }
    }

    let name = "cardano_node_response_time_seconds";
    let _ = writeln!(out, "# HELP {name} Response time for node API calls.");
    let _ = writeln!(out, "# TYPE {name} histogram");
    for (node_id, series) in &state.nodes {
        let labels = format!("node_id=\"{}\",endpoint=\"tip\"", escape_label(node_id));
        let hist = &series.response_time;
        for (bound, count) in LATENCY_BUCKETS.iter().zip(hist.buckets.iter()) {
            let _ = writeln!(out, "{name}_bucket{{{labels},le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(out, "{name}_bucket{{{labels},le=\"+Inf\"}} {}", hist.count);
        let _ = writeln!(out, "{name}_sum{{{labels}}} {}", hist.sum);
        let _ = writeln!(out, "{name}_count{{{labels}}} {}", hist.count);
    }

    let name = "cardano_node_errors_total";
    let _ = writeln!(out, "# HELP {name} Total number of node errors.");
    let _ = writeln!(out, "# TYPE {name} counter");
    for ((node_id, error_type), count) in &state.errors {
        let _ = writeln!(
            out,
            "{name}{{node_id=\"{}\",error_type=\"{}\"}} {count}",
            escape_label(node_id),
            escape_label(error_type)
        );
    }

    out
}

/// Escape a label value per the text exposition format.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
