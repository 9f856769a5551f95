//! Error types for the Vigil session core.
//!
//! Expected conditions (a denied connection, an aborted prompt, a failed
//! precondition) are modeled as result values, not errors. `VigilError` is
//! reserved for transport faults, codec failures, and lifecycle boundaries
//! that are documented as fallible (`CommunicationHost::start`/`stop`).

use std::time::Duration;
use thiserror::Error;

/// Main error type for the Vigil workspace.
#[derive(Debug, Error)]
pub enum VigilError {
    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection to {addr} failed: {message}")]
    ConnectionFailed { addr: String, message: String },

    #[error("Connection to {addr} lost")]
    ConnectionLost { addr: String },

    // Proxy contract errors
    #[error("Proxy is not connected: no communication token has been issued")]
    NotConnected,

    #[error("Remote host denied the connection")]
    ConnectionDenied,

    #[error("Remote host rejected the request as unauthorized")]
    Unauthorized,

    #[error("Unexpected response: expected {expected}")]
    UnexpectedResponse { expected: &'static str },

    // Host lifecycle errors
    #[error("Communication host failed to start: {message}")]
    HostStartFailed { message: String },

    #[error("Communication host did not stop within {0:?}")]
    HostStopTimeout(Duration),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

impl From<std::io::Error> for VigilError {
    fn from(err: std::io::Error) -> Self {
        VigilError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(err: serde_json::Error) -> Self {
        VigilError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl VigilError {
    /// Check if this error indicates a broken or unreachable peer.
    ///
    /// Used by the proxy's liveness loop to distinguish a fatal transport
    /// fault (immediate connection-lost notification) from a slow peer.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            VigilError::Io { .. }
                | VigilError::ConnectionFailed { .. }
                | VigilError::ConnectionLost { .. }
        )
    }
}
