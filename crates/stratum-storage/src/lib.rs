//! # stratum-storage: Append-only segmented commit-log storage
//!
//! This crate implements the durable core of Stratum: an append-only,
//! offset-addressed log persisted as a sequence of segments on local
//! storage.
//!
//! # Layers
//!
//! The log is a four-layer stack, built leaves-first:
//!
//! 1. [`Store`]: length-prefixed record frames appended to a single file.
//! 2. [`Index`]: a memory-mapped table of fixed-width entries mapping
//!    segment-relative offsets to store positions.
//! 3. [`Segment`]: one store and one index under a shared base offset; the
//!    unit of roll-over.
//! 4. [`Log`]: the ordered segment list, with one active segment receiving
//!    appends and reads routed by offset.
//!
//! # File Layout
//!
//! ```text
//! log_dir/
//!   0.store      # frames: [length: u64 BE][payload]
//!   0.index      # entries: [relative_offset: u32 BE][position: u64 BE]
//!   24.store     # next segment, base offset 24
//!   24.index
//! ```
//!
//! Each index file is pre-grown to its configured maximum before
//! memory-mapping and truncated back to its logical size on clean close, so
//! a restart can derive the record count from the last entry.
//!
//! # Example
//!
//! ```ignore
//! use stratum_storage::{Log, LogConfig, Record};
//!
//! let log = Log::open("/data/stratum", LogConfig::default())?;
//!
//! let offset = log.append(Record::new("hello world"))?;
//! let record = log.read(offset)?;
//! assert_eq!(record.value().as_ref(), b"hello world");
//! ```

mod config;
mod error;
mod index;
mod log;
mod record;
mod segment;
mod store;

pub use config::{LogConfig, SegmentConfig};
pub use error::{StorageError, StorageResult};
pub use index::{Index, IndexEntry, ENTRY_WIDTH};
pub use log::{Log, LogReader};
pub use record::Record;
pub use segment::Segment;
pub use store::{Store, LEN_WIDTH};

#[cfg(test)]
mod tests;
