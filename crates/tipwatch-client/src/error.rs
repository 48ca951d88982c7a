//! Error types for upstream calls.

use thiserror::Error;

/// Result type alias for upstream client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure of a single upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Connection, handshake, or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish before its deadline.
    #[error("request timed out")]
    Timeout,

    /// The node answered with a non-2xx status.
    #[error("node returned status {0}")]
    BadStatus(u16),

    /// The body could not be decoded into the expected type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The configured base address is unusable.
    #[error("invalid node url: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Network(_) => "network",
            ClientError::Timeout => "timeout",
            ClientError::BadStatus(_) => "bad_status",
            ClientError::Decode(_) => "decode",
            ClientError::InvalidUrl(_) => "invalid_url",
        }
    }
}
