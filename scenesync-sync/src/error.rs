//! Error types for the session layer.

use scenesync_proxy::ProxyError;
use thiserror::Error;

/// Result type for session operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in session operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A message or configuration could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Frame I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The proxy engine rejected the operation.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// The message targets a collection this session does not synchronize.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// Protocol error (version mismatch, inconsistent or oversized message).
    #[error("protocol error: {0}")]
    Protocol(String),
}
