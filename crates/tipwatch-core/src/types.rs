//! Upstream wire types and the published metrics snapshot.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The most recently adopted block position known to a node.
///
/// Field names follow the node's REST API (`blockNo`, `slotNo`, ...).
/// Missing fields decode to their zero value, matching the node's own
/// lenient clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TipInfo {
    pub block_no: u64,
    pub slot_no: u64,
    pub hash: String,
    pub epoch: u64,
}

/// Local and network tips as reported by `/api/rest/v0/network`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkInfo {
    pub local_tip: TipInfo,
    pub network_tip: TipInfo,
    pub node_era: String,
    /// Node-reported progress string. Informational only; the collector
    /// derives its own figure from the two tips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_progress: Option<String>,
}

/// Current derived metrics for one node, replaced wholesale each cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub node_id: String,
    pub block_height: u64,
    /// Percentage in `[0, 100]`.
    pub sync_progress: f64,
    pub connections: u32,
    #[serde(rename = "uptime")]
    pub uptime_secs: u64,
    /// Unix seconds of the last successful cycle, 0 before the first one.
    #[serde(rename = "timestamp")]
    pub updated_at: u64,
    pub healthy: bool,
    pub latency_ms: f64,
}

impl MetricsSnapshot {
    /// The zeroed, unhealthy snapshot a process starts with.
    pub fn initial(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
