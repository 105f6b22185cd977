//! Server error types.

use stratum_storage::StorageError;
use stratum_wire::WireError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur during server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// Log storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// TLS configuration or negotiation error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A connection was closed mid-operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// An ACL policy file could not be parsed.
    #[error("invalid ACL policy: {0}")]
    InvalidPolicy(String),
}
