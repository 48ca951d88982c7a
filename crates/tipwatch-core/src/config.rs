//! tipwatch.toml configuration and layered resolution.
//!
//! Resolution order: built-in defaults, then a TOML file, then CLI/env
//! overrides. Each layer is a [`ConfigFile`] with optional fields, applied
//! on top of the previous result with [`MonitorConfig::apply`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Upper bound for `interval` and `request_timeout`.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Log output format for the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::LogFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// One configuration layer. Every field is optional; unset fields leave
/// the lower layer untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub node_url: Option<String>,
    pub port: Option<u16>,
    pub interval: Option<String>,
    pub request_timeout: Option<String>,
    pub node_id: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Fully resolved monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Base address of the node's REST API.
    pub node_url: String,
    /// Port the HTTP surface listens on.
    pub port: u16,
    /// Collection interval.
    pub interval: Duration,
    /// Per-call upstream deadline.
    pub request_timeout: Duration,
    /// Identifier attached to every snapshot and metric label.
    pub node_id: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            node_url: "http://localhost:12798".to_string(),
            port: 8080,
            interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            node_id: "cardano-node-1".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl MonitorConfig {
    /// Apply a layer on top of this config.
    pub fn apply(mut self, layer: &ConfigFile) -> ConfigResult<Self> {
        if let Some(url) = &layer.node_url {
            self.node_url = url.trim_end_matches('/').to_string();
        }
        if let Some(port) = layer.port {
            self.port = port;
        }
        if let Some(interval) = &layer.interval {
            self.interval = parse_duration(interval).ok_or_else(|| ConfigError::Duration {
                key: "interval",
                value: interval.clone(),
            })?;
        }
        if let Some(timeout) = &layer.request_timeout {
            self.request_timeout =
                parse_duration(timeout).ok_or_else(|| ConfigError::Duration {
                    key: "request_timeout",
                    value: timeout.clone(),
                })?;
        }
        if let Some(node_id) = &layer.node_id {
            self.node_id = node_id.clone();
        }
        if let Some(level) = &layer.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = layer.log_format {
            self.log_format = format;
        }
        Ok(self)
    }

    /// Check invariants the collector relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be non-zero".into(),
            ));
        }
        if self.interval > MAX_DURATION {
            return Err(ConfigError::Invalid(format!(
                "interval must be at most {}s",
                MAX_DURATION.as_secs()
            )));
        }
        if self.request_timeout > MAX_DURATION {
            return Err(ConfigError::Invalid(format!(
                "request_timeout must be at most {}s",
                MAX_DURATION.as_secs()
            )));
        }
        if !self.node_url.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "node_url must be an http:// URL, got {:?}",
                self.node_url
            )));
        }
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
