//! Unified error handling for tether.
//!
//! Connection-level failures are split by how the caller should react:
//! transport and server errors end one attempt and are retryable, while
//! [`ConnectionError::MaxRetriesExceeded`] and
//! [`ConnectionError::Interrupted`] mean the engine has given up.

use thiserror::Error;

// ============================================================================
// Connection Errors
// ============================================================================

/// Errors surfaced by [`crate::Connection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out connecting to {0}")]
    DialTimeout(String),

    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),

    #[error("connection closed by server")]
    Closed,

    #[error("server sent ERROR: {0}")]
    ServerError(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_proto::ProtocolError),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    /// An interrupt/terminate signal arrived while waiting to reconnect.
    #[error("interrupted by signal")]
    Interrupted,

    /// The retry wrapper gave up.
    #[error("maximum retries reached after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::DialTimeout(_) => "dial_timeout",
            Self::InvalidServerName(_) => "invalid_server_name",
            Self::Closed => "closed",
            Self::ServerError(_) => "server_error",
            Self::Protocol(_) => "protocol",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
            Self::Interrupted => "interrupted",
            Self::MaxRetriesExceeded { .. } => "max_retries",
        }
    }

    /// Whether the retry wrapper should try again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Interrupted | Self::MaxRetriesExceeded { .. } | Self::AlreadyConnected
        )
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T = ()> = Result<T, ConnectionError>;
