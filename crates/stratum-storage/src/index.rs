//! Memory-mapped offset index for a segment.
//!
//! The index is a flat array of fixed-width entries mapping a
//! segment-relative offset to the byte position of that record's frame in
//! the sibling store file:
//!
//! ```text
//! ┌─────────────────────────┬───────────────────┐
//! │ relative_offset: u32 BE │ position: u64 BE  │ ...
//! └─────────────────────────┴───────────────────┘
//! ```
//!
//! The file is physically grown to `max_index_bytes` before mapping, because
//! a mapping cannot be resized in place. While the index is open its on-disk
//! length therefore says nothing about how many entries are valid; the
//! logical size lives in memory and is written back as the file length on a
//! clean close.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;
use tracing::warn;

use crate::config::SegmentConfig;
use crate::error::{StorageError, StorageResult};

/// Width of the relative-offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// One decoded index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset relative to the owning segment's base offset.
    pub relative_offset: u32,
    /// Byte position of the record's frame in the store file.
    pub position: u64,
}

/// Offset-to-position lookup table backed by a shared memory mapping.
///
/// The index is not internally locked; the owning segment is only reachable
/// through the log, whose locking serializes every mutation.
#[derive(Debug)]
pub struct Index {
    file: File,
    mmap: MmapMut,
    size: u64,
}

impl Index {
    /// Opens (or creates) the index file at `path` and maps it.
    ///
    /// `store_len` is the byte length of the sibling store file. It bounds
    /// the positions a valid entry may carry, which is what lets an index
    /// left over-sized by a crash be recovered: the longest prefix of
    /// entries with dense relative offsets and strictly increasing, in-store
    /// positions is the valid one. A file whose length is below the maximum
    /// was closed cleanly, and its length is its logical size.
    pub fn open(
        path: impl AsRef<Path>,
        config: &SegmentConfig,
        store_len: u64,
    ) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        let disk_len = file.metadata()?.len();
        if disk_len < config.max_index_bytes {
            // Grow before mapping; the mapping cannot be resized later.
            file.set_len(config.max_index_bytes)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let size = if disk_len >= config.max_index_bytes {
            let recovered = recovered_size(&mmap, store_len);
            if recovered != disk_len {
                warn!(
                    path = %path.as_ref().display(),
                    recovered_entries = recovered / ENTRY_WIDTH,
                    "index was not closed cleanly, recovered logical size by scan"
                );
            }
            recovered
        } else {
            disk_len - disk_len % ENTRY_WIDTH
        };

        Ok(Self { file, mmap, size })
    }

    /// Appends an entry, failing with [`StorageError::IndexFull`] when the
    /// mapping has no room. That failure is the roll-over signal.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> StorageResult<()> {
        if self.size + ENTRY_WIDTH > self.mmap.len() as u64 {
            return Err(StorageError::IndexFull);
        }

        let at = self.size as usize;
        self.mmap[at..at + OFFSET_WIDTH as usize].copy_from_slice(&relative_offset.to_be_bytes());
        self.mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Reads the entry at `slot` (the relative offset).
    pub fn read(&self, slot: u32) -> StorageResult<IndexEntry> {
        if self.size == 0 {
            return Err(StorageError::IndexEmpty);
        }

        let at = u64::from(slot) * ENTRY_WIDTH;
        if self.size < at + ENTRY_WIDTH {
            return Err(StorageError::IndexSlotOutOfRange { slot });
        }

        Ok(decode_entry(&self.mmap, at as usize))
    }

    /// Reads the last written entry, failing with
    /// [`StorageError::IndexEmpty`] on a fresh index. Segments derive their
    /// next offset from this at startup.
    pub fn last_entry(&self) -> StorageResult<IndexEntry> {
        if self.size == 0 {
            return Err(StorageError::IndexEmpty);
        }
        self.read((self.size / ENTRY_WIDTH - 1) as u32)
    }

    /// Logical size of the index in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entries in the index.
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Syncs the mapping, fsyncs the file, and truncates it back to the
    /// logical size.
    ///
    /// The truncation is what makes the next startup cheap: a cleanly closed
    /// index file's length equals its valid bytes, so no scan is needed.
    pub fn close(self) -> StorageResult<()> {
        let Index { file, mmap, size } = self;

        mmap.flush()?;
        file.sync_all()?;

        // Unmap before shrinking the file under the mapping.
        drop(mmap);
        file.set_len(size)?;

        Ok(())
    }
}

fn decode_entry(mmap: &MmapMut, at: usize) -> IndexEntry {
    let mut offset_buf = [0u8; OFFSET_WIDTH as usize];
    offset_buf.copy_from_slice(&mmap[at..at + OFFSET_WIDTH as usize]);

    let mut position_buf = [0u8; POSITION_WIDTH as usize];
    position_buf.copy_from_slice(&mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]);

    IndexEntry {
        relative_offset: u32::from_be_bytes(offset_buf),
        position: u64::from_be_bytes(position_buf),
    }
}

/// Scans for the longest valid prefix of entries in an index that was never
/// truncated back to its logical size.
///
/// Entry `i` is valid when its relative offset equals `i`, its position lies
/// inside the store, and positions strictly increase. Slot 0 additionally
/// requires a non-empty store, since a zeroed slot is indistinguishable from
/// a genuine first entry.
fn recovered_size(mmap: &MmapMut, store_len: u64) -> u64 {
    let slots = mmap.len() as u64 / ENTRY_WIDTH;
    let mut prev_position = 0u64;

    for slot in 0..slots {
        let entry = decode_entry(mmap, (slot * ENTRY_WIDTH) as usize);

        let dense = u64::from(entry.relative_offset) == slot;
        let in_store = entry.position < store_len;
        let advancing = slot == 0 || entry.position > prev_position;

        if !(dense && in_store && advancing) {
            return slot * ENTRY_WIDTH;
        }
        prev_position = entry.position;
    }

    slots * ENTRY_WIDTH
}

#[cfg(test)]
mod index_tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> SegmentConfig {
        SegmentConfig {
            max_index_bytes: 1024,
            ..SegmentConfig::default()
        }
    }

    #[test]
    fn write_then_read_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");
        let mut index = Index::open(&path, &small_config(), 0).unwrap();

        for (slot, position) in [(0u32, 0u64), (1, 10), (2, 20)] {
            index.write(slot, position).unwrap();
            let entry = index.read(slot).unwrap();
            assert_eq!(entry.relative_offset, slot);
            assert_eq!(entry.position, position);
        }

        assert!(matches!(
            index.read(3),
            Err(StorageError::IndexSlotOutOfRange { slot: 3 })
        ));
    }

    #[test]
    fn read_of_fresh_index_fails_empty() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("0.index"), &small_config(), 0).unwrap();

        assert!(matches!(index.read(0), Err(StorageError::IndexEmpty)));
        assert!(matches!(index.last_entry(), Err(StorageError::IndexEmpty)));
    }

    #[test]
    fn close_truncates_to_logical_size_and_reopen_finds_last_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, &small_config(), 0).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 10).unwrap();
        index.write(2, 20).unwrap();
        index.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * ENTRY_WIDTH);

        // store_len is irrelevant on the clean-close path
        let reopened = Index::open(&path, &small_config(), 0).unwrap();
        let last = reopened.last_entry().unwrap();
        assert_eq!(last.relative_offset, 2);
        assert_eq!(last.position, 20);
    }

    #[test]
    fn unclean_shutdown_is_recovered_by_scan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, &small_config(), 0).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        index.write(2, 38).unwrap();
        index.write(3, 57).unwrap();
        // Dropping without close() leaves the file at its pre-grown maximum,
        // as a crash would.
        drop(index);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);

        let reopened = Index::open(&path, &small_config(), 76).unwrap();
        assert_eq!(reopened.entries(), 4);
        assert_eq!(reopened.last_entry().unwrap().position, 57);
    }

    #[test]
    fn recovery_rejects_entries_past_the_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, &small_config(), 0).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        index.write(2, 38).unwrap();
        drop(index);

        // The store only made it to byte 38 on disk: the last entry points
        // past EOF and must not survive recovery.
        let reopened = Index::open(&path, &small_config(), 38).unwrap();
        assert_eq!(reopened.entries(), 2);

        // An empty store invalidates even slot 0.
        drop(reopened);
        let empty_store = Index::open(&path, &small_config(), 0).unwrap();
        assert_eq!(empty_store.entries(), 0);
    }

    #[test]
    fn full_index_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let config = SegmentConfig {
            max_index_bytes: 3 * ENTRY_WIDTH,
            ..SegmentConfig::default()
        };

        let mut index = Index::open(dir.path().join("0.index"), &config, 0).unwrap();
        for slot in 0..3 {
            index.write(slot, u64::from(slot) * 19).unwrap();
        }

        assert!(matches!(index.write(3, 57), Err(StorageError::IndexFull)));
    }
}
