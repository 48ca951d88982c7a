//! tipwatch-metrics — the polling-and-metrics pipeline.
//!
//! Polls a node on a fixed interval, derives health and sync metrics,
//! publishes them into a single-slot snapshot store, and forwards each
//! snapshot to a metrics sink.
//!
//! # Architecture
//!
//! ```text
//! Collector (one background task)
//!   ├── NodeApi::fetch_tip()     — mandatory, failure flips health
//!   ├── NodeApi::fetch_network() — best-effort, failure only counted
//!   ├── SnapshotStore::write()   ← read() by any number of HTTP handlers
//!   └── MetricsSink::record()    → PrometheusSink → /metrics text
//! ```

pub mod collector;
pub mod prometheus;
pub mod sink;
pub mod store;

pub use collector::{
    Collector, CycleOutcome, NETWORK_FETCH_ERROR, TIP_FETCH_ERROR, placeholder_connections,
    sync_progress,
};
pub use prometheus::PrometheusSink;
pub use sink::MetricsSink;
pub use store::SnapshotStore;
