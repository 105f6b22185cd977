//! Client error types.

use std::io;

use stratum_wire::{ErrorCode, ErrorResponse, WireError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// I/O error on the connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The server closed the connection mid-exchange.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server reported the requested offset is outside the log.
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(String),

    /// The server refused the request for this connection's subject.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other server-reported failure.
    #[error("server error ({code:?}): {message}")]
    Server { code: ErrorCode, message: String },

    /// The server answered with a payload the request cannot accept.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },
}

impl From<ErrorResponse> for ClientError {
    fn from(err: ErrorResponse) -> Self {
        match err.code {
            ErrorCode::OffsetOutOfRange => ClientError::OffsetOutOfRange(err.message),
            ErrorCode::Unauthorized => ClientError::Unauthorized(err.message),
            code => ClientError::Server {
                code,
                message: err.message,
            },
        }
    }
}
