//! Configuration for the log and its segments.

use stratum_types::Offset;

/// Configuration shared by the log, its segments, and their files.
///
/// One value flows from [`Log::open`](crate::Log::open) down through every
/// segment the log ever creates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub segment: SegmentConfig,
}

/// Size caps and initial offset for segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    /// Soft cap on a segment's store file in bytes. An append that crosses
    /// the cap still succeeds; the segment is considered maxed afterwards.
    pub max_store_bytes: u64,
    /// Hard cap on a segment's index file in bytes. This is also the length
    /// the index file is pre-grown to before memory-mapping, so it bounds
    /// the number of records a segment can hold.
    pub max_index_bytes: u64,
    /// Base offset of the first segment created in an empty log directory.
    pub initial_offset: Offset,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            initial_offset: Offset::ZERO,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_initial_offset(mut self, offset: Offset) -> Self {
        self.segment.initial_offset = offset;
        self
    }
}
