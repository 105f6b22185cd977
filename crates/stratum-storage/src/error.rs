//! Error types for storage operations.

use std::io;

use stratum_types::Offset;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the log storage layer.
///
/// `OffsetOutOfRange` is the only variant with meaning to remote callers;
/// everything else is surfaced verbatim and treated as opaque by the RPC
/// layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem or mmap I/O error, propagated without interpretation.
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),

    /// The requested offset is below the first segment's base offset or at
    /// or past the active segment's next offset.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange { offset: Offset },

    /// The index's backing mmap has no room for another entry. Internal
    /// signal that the owning segment must roll over.
    #[error("index is full")]
    IndexFull,

    /// Read of an index that has no entries. Internal signal that a segment
    /// is fresh.
    #[error("index is empty")]
    IndexEmpty,

    /// Read of an index slot past the last written entry.
    #[error("index slot {slot} past end of index")]
    IndexSlotOutOfRange { slot: u32 },

    /// Record encoding or decoding failed.
    #[error("record serialization: {0}")]
    Serialization(String),

    /// Operation on a log whose segments have been closed.
    #[error("log is closed")]
    Closed,
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
