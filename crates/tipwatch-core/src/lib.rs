//! tipwatch-core — shared types and configuration for tipwatch.
//!
//! Holds the upstream wire types ([`TipInfo`], [`NetworkInfo`]), the
//! single [`MetricsSnapshot`] the collector publishes, and the layered
//! [`MonitorConfig`] consumed by the daemon.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigFile, LogFormat, MAX_DURATION, MonitorConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
