//! Framed byte storage backing a segment.
//!
//! A store is a single append-only file holding length-prefixed record
//! frames:
//!
//! ```text
//! ┌──────────────────┬──────────────────┐
//! │ length: u64 (BE) │ payload: n bytes │ ...
//! └──────────────────┴──────────────────┘
//! ```
//!
//! Appends go through a user-space buffer; reads flush that buffer first so
//! a position handed out by [`Store::append`] is always readable. The store
//! does not know about offsets; mapping offsets to positions is the index's
//! job.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;

use crate::error::StorageResult;

/// Width of the big-endian length prefix on every frame.
pub const LEN_WIDTH: u64 = 8;

/// Durable, sequential, framed byte storage with positional reads.
///
/// All operations serialize on one internal mutex: the buffered writer is
/// not safe to drain concurrently with reads, so reads take the same lock
/// appends do.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    writer: BufWriter<File>,
    reader: File,
    size: u64,
}

impl Store {
    /// Opens (or creates) the store file at `path`.
    ///
    /// The current file length becomes the append position; a store file is
    /// never padded, so its length is authoritative.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        let reader = File::open(path)?;

        Ok(Self {
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                reader,
                size,
            }),
        })
    }

    /// Appends `payload` as one frame.
    ///
    /// Returns the number of bytes written (frame width, i.e. prefix plus
    /// payload) and the byte position the frame starts at. The write is
    /// buffered; it is not durable until [`Store::sync`] or [`Store::close`].
    pub fn append(&self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let position = inner.size;
        inner.writer.write_all(&(payload.len() as u64).to_be_bytes())?;
        inner.writer.write_all(payload)?;

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;

        Ok((written, position))
    }

    /// Reads the frame starting at `position`, returning its payload.
    pub fn read(&self, position: u64) -> StorageResult<Bytes> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.writer.flush()?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner.reader.read_exact_at(&mut len_buf, position)?;

        let len = u64::from_be_bytes(len_buf);
        let mut payload = vec![0u8; len as usize];
        inner.reader.read_exact_at(&mut payload, position + LEN_WIDTH)?;

        Ok(Bytes::from(payload))
    }

    /// Reads raw bytes at an arbitrary file position into `buf`.
    ///
    /// Used by the whole-log reader, which streams store files verbatim and
    /// parses the framing itself.
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.writer.flush()?;

        Ok(inner.reader.read_at(buf, position)?)
    }

    /// Returns the logical size of the store in bytes, including buffered
    /// appends that have not reached the file yet.
    pub fn size(&self) -> u64 {
        self.inner.lock().expect("store lock poisoned").size
    }

    /// Drains the write buffer to the OS.
    pub fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.writer.flush()?;
        Ok(())
    }

    /// Drains the write buffer and fsyncs the file.
    pub fn sync(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Flushes and fsyncs before the file handles are dropped.
    ///
    /// The index that references this store fsyncs on close, so the store
    /// must be on disk no later than the index is.
    pub fn close(&self) -> StorageResult<()> {
        self.sync()
    }
}
