//! Segment: one store plus one index under a shared base offset.

use std::path::Path;
use std::sync::Arc;

use stratum_types::Offset;

use crate::config::SegmentConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::Index;
use crate::record::Record;
use crate::store::Store;

/// The unit of roll-over.
///
/// A segment owns the pair of files named by its base offset
/// (`<base>.store`, `<base>.index`) and translates between absolute offsets
/// and index-relative offsets. Records in `[base_offset, next_offset)` live
/// here; the next append receives `next_offset`.
#[derive(Debug)]
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: Offset,
    next_offset: Offset,
    config: SegmentConfig,
}

impl Segment {
    /// Opens (or creates) the segment for `base_offset` inside `dir`.
    ///
    /// The next offset is derived from the index: a fresh index means the
    /// segment starts at its base, otherwise it resumes one past the last
    /// indexed record.
    pub fn open(dir: &Path, base_offset: Offset, config: SegmentConfig) -> StorageResult<Self> {
        let store = Arc::new(Store::open(dir.join(format!("{base_offset}.store")))?);
        let index = Index::open(
            dir.join(format!("{base_offset}.index")),
            &config,
            store.size(),
        )?;

        let next_offset = match index.last_entry() {
            Ok(entry) => base_offset + u64::from(entry.relative_offset) + 1,
            Err(StorageError::IndexEmpty) => base_offset,
            Err(e) => return Err(e),
        };

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends a record, stamping it with the segment's next offset.
    pub fn append(&mut self, mut record: Record) -> StorageResult<Offset> {
        let offset = self.next_offset;
        record.set_offset(offset);

        let encoded = record.to_bytes()?;
        let (_, position) = self.store.append(&encoded)?;
        self.index.write((offset - self.base_offset) as u32, position)?;

        self.next_offset = offset.next();
        Ok(offset)
    }

    /// Reads the record at an absolute offset.
    pub fn read(&self, offset: Offset) -> StorageResult<Record> {
        let Some(relative) = offset.distance_from(self.base_offset) else {
            return Err(StorageError::OffsetOutOfRange { offset });
        };

        let entry = match self.index.read(relative as u32) {
            Ok(entry) => entry,
            Err(StorageError::IndexEmpty | StorageError::IndexSlotOutOfRange { .. }) => {
                return Err(StorageError::OffsetOutOfRange { offset });
            }
            Err(e) => return Err(e),
        };

        let encoded = self.store.read(entry.position)?;
        Record::from_bytes(&encoded)
    }

    /// Whether this segment holds `offset`.
    pub fn contains(&self, offset: Offset) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Whether either child file has reached its cap.
    ///
    /// The store cap is soft (the append that crossed it succeeded); the
    /// index cap is hard. Either way the log must roll over before the next
    /// append.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    pub fn base_offset(&self) -> Offset {
        self.base_offset
    }

    pub fn next_offset(&self) -> Offset {
        self.next_offset
    }

    /// Shared handle to the store, for the whole-log reader.
    pub(crate) fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Closes index then store.
    pub fn close(self) -> StorageResult<()> {
        self.index.close()?;
        self.store.close()
    }
}

#[cfg(test)]
mod segment_tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    use crate::index::ENTRY_WIDTH;

    #[test]
    fn append_read_and_roll_over_signals() {
        let dir = TempDir::new().unwrap();
        let config = SegmentConfig {
            max_store_bytes: 1024,
            max_index_bytes: 3 * ENTRY_WIDTH,
            initial_offset: Offset::ZERO,
        };

        let base = Offset::new(16);
        let mut segment = Segment::open(dir.path(), base, config).unwrap();
        assert_eq!(segment.next_offset(), base);
        assert!(!segment.is_maxed());

        for i in 0..3u64 {
            let offset = segment
                .append(Record::new(Bytes::from("hello world")))
                .unwrap();
            assert_eq!(offset, base + i);

            let record = segment.read(offset).unwrap();
            assert_eq!(record.value().as_ref(), b"hello world");
            assert_eq!(record.offset(), offset);
        }

        // Index has three slots, so the segment is maxed by the index and a
        // fourth append must be refused by it.
        assert!(segment.is_maxed());
        let err = segment.append(Record::new(Bytes::from("hello world")));
        assert!(matches!(err, Err(StorageError::IndexFull)));
    }

    #[test]
    fn maxed_by_store_cap() {
        let dir = TempDir::new().unwrap();
        // Each framed record is well over 10 bytes, so one append crosses
        // the soft cap.
        let config = SegmentConfig {
            max_store_bytes: 10,
            max_index_bytes: 1024,
            initial_offset: Offset::ZERO,
        };

        let mut segment = Segment::open(dir.path(), Offset::ZERO, config).unwrap();
        segment
            .append(Record::new(Bytes::from("hello world")))
            .unwrap();

        assert!(segment.is_maxed());
    }

    #[test]
    fn reopen_resumes_after_last_indexed_record() {
        let dir = TempDir::new().unwrap();
        let config = SegmentConfig::default();
        let base = Offset::new(5);

        let mut segment = Segment::open(dir.path(), base, config).unwrap();
        for _ in 0..4 {
            segment.append(Record::new(Bytes::from("payload"))).unwrap();
        }
        segment.close().unwrap();

        let reopened = Segment::open(dir.path(), base, config).unwrap();
        assert_eq!(reopened.next_offset(), base + 4);
        assert_eq!(reopened.read(base + 3).unwrap().offset(), base + 3);
    }

    #[test]
    fn reads_outside_the_segment_are_out_of_range() {
        let dir = TempDir::new().unwrap();
        let base = Offset::new(10);
        let mut segment = Segment::open(dir.path(), base, SegmentConfig::default()).unwrap();
        segment.append(Record::new(Bytes::from("only one"))).unwrap();

        // Below the base offset.
        assert!(matches!(
            segment.read(Offset::new(3)),
            Err(StorageError::OffsetOutOfRange { .. })
        ));
        // At next_offset.
        assert!(matches!(
            segment.read(base + 1),
            Err(StorageError::OffsetOutOfRange { .. })
        ));
    }
}
