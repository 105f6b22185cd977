//! Error types for the wire protocol.

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while encoding or decoding frames and messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame does not start with the protocol magic.
    #[error("invalid frame magic: {0:#010x}")]
    InvalidMagic(u32),

    /// The peer speaks a protocol version we do not.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// The frame header claims a payload larger than the limit.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// The payload does not match the checksum in the header.
    #[error("frame checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Message encoding or decoding failed.
    #[error("message serialization: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for WireError {
    fn from(err: bincode::Error) -> Self {
        WireError::Serialization(err.to_string())
    }
}
