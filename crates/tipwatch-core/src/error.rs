//! Error types for configuration loading.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {key}: {value:?}")]
    Duration { key: &'static str, value: String },

    #[error("invalid log format: {0:?} (expected \"text\" or \"json\")")]
    LogFormat(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
