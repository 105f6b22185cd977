//! The log: an ordered list of segments behind one directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use stratum_types::Offset;
use tracing::{debug, warn};

use crate::config::LogConfig;
use crate::error::{StorageError, StorageResult};
use crate::record::Record;
use crate::segment::Segment;
use crate::store::Store;

/// An append-only, segmented, offset-addressed log.
///
/// The log owns every segment under its directory. The segment with the
/// greatest base offset is the active one and the only one appended to;
/// reads are routed to whichever segment covers the requested offset.
///
/// A single readers-writer lock guards the segment list: `append`, `close`,
/// `remove`, and `reset` take it exclusively, `read` and `reader` take it
/// shared. Offsets are assigned under the exclusive lock, which is what
/// makes them strictly monotonic.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Opens the log in `dir`, recovering any segments already on disk.
    ///
    /// Segment files name their base offset, so recovery is: list the
    /// directory, collect the distinct numeric base offsets, and open a
    /// segment for each in ascending order. An empty directory gets one
    /// fresh segment at the configured initial offset.
    pub fn open(dir: impl Into<PathBuf>, config: LogConfig) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let log = Self {
            dir,
            config,
            segments: RwLock::new(Vec::new()),
        };
        log.setup()?;
        Ok(log)
    }

    fn setup(&self) -> StorageResult<()> {
        let mut segments = self.segments.write().expect("log lock poisoned");
        *segments = Self::load_segments(&self.dir, &self.config)?;
        Ok(())
    }

    fn load_segments(dir: &Path, config: &LogConfig) -> StorageResult<Vec<Segment>> {
        let mut bases = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            let known_extension = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("store" | "index")
            );
            let base = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok());

            match base {
                Some(base) if known_extension => {
                    bases.insert(base);
                }
                _ => warn!(path = %path.display(), "ignoring unrecognized file in log directory"),
            }
        }

        let mut recovered = Vec::with_capacity(bases.len().max(1));
        for base in bases {
            recovered.push(Segment::open(dir, Offset::new(base), config.segment)?);
        }

        if recovered.is_empty() {
            recovered.push(Segment::open(
                dir,
                config.segment.initial_offset,
                config.segment,
            )?);
        } else {
            debug!(segments = recovered.len(), dir = %dir.display(), "recovered log");
        }

        Ok(recovered)
    }

    fn close_segments(segments: &mut Vec<Segment>) -> StorageResult<()> {
        for segment in segments.drain(..) {
            segment.close()?;
        }
        Ok(())
    }

    /// Appends a record to the active segment, returning its offset.
    ///
    /// Rolls over to a new segment when the active one reports itself
    /// maxed: after the append that crossed a cap, or before appending at
    /// all if a crash left a maxed segment active.
    pub fn append(&self, record: Record) -> StorageResult<Offset> {
        let mut segments = self.segments.write().expect("log lock poisoned");

        if segments.last().is_some_and(Segment::is_maxed) {
            let base = segments.last().expect("active segment").next_offset();
            segments.push(Segment::open(&self.dir, base, self.config.segment)?);
        }

        let active = segments.last_mut().ok_or(StorageError::Closed)?;
        let offset = active.append(record)?;

        if segments.last().expect("active segment").is_maxed() {
            debug!(base = %offset.next(), "active segment maxed, rolling over");
            segments.push(Segment::open(&self.dir, offset.next(), self.config.segment)?);
        }

        Ok(offset)
    }

    /// Reads the record at `offset`.
    pub fn read(&self, offset: Offset) -> StorageResult<Record> {
        let segments = self.segments.read().expect("log lock poisoned");

        segments
            .iter()
            .find(|s| s.contains(offset))
            .ok_or(StorageError::OffsetOutOfRange { offset })?
            .read(offset)
    }

    /// Returns a reader over the raw store bytes of every segment, in
    /// order.
    ///
    /// The stream is a concatenation of length-prefixed frames; consumers
    /// parse the framing themselves. The reader snapshots each store's
    /// length at creation, so records appended afterwards are not observed,
    /// and it holds its own handles to the store files, so `reset` or
    /// `remove` cannot invalidate it.
    pub fn reader(&self) -> LogReader {
        let segments = self.segments.read().expect("log lock poisoned");

        LogReader {
            parts: segments
                .iter()
                .map(|s| {
                    let store = s.store();
                    let len = store.size();
                    ReaderPart {
                        store,
                        len,
                        pos: 0,
                    }
                })
                .collect(),
            current: 0,
        }
    }

    /// Closes every segment in order. Appends after close fail with
    /// [`StorageError::Closed`]; `reset` reopens the log.
    pub fn close(&self) -> StorageResult<()> {
        let mut segments = self.segments.write().expect("log lock poisoned");
        Self::close_segments(&mut segments)
    }

    /// Closes the log and deletes its directory.
    pub fn remove(&self) -> StorageResult<()> {
        let mut segments = self.segments.write().expect("log lock poisoned");
        Self::close_segments(&mut segments)?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Removes the log and recreates it empty at the configured initial
    /// offset.
    pub fn reset(&self) -> StorageResult<()> {
        let mut segments = self.segments.write().expect("log lock poisoned");
        Self::close_segments(&mut segments)?;
        fs::remove_dir_all(&self.dir)?;
        fs::create_dir_all(&self.dir)?;
        *segments = Self::load_segments(&self.dir, &self.config)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

/// Streaming reader over the concatenated store files of a log.
///
/// Returned by [`Log::reader`]; primarily used to snapshot the whole log
/// for replication.
#[derive(Debug)]
pub struct LogReader {
    parts: Vec<ReaderPart>,
    current: usize,
}

#[derive(Debug)]
struct ReaderPart {
    store: Arc<Store>,
    /// Store length captured when the reader was created.
    len: u64,
    pos: u64,
}

impl io::Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(part) = self.parts.get_mut(self.current) {
            if part.pos >= part.len {
                self.current += 1;
                continue;
            }

            let want = buf.len().min((part.len - part.pos) as usize);
            let n = part
                .store
                .read_at(&mut buf[..want], part.pos)
                .map_err(into_io)?;
            if n == 0 {
                self.current += 1;
                continue;
            }

            part.pos += n as u64;
            return Ok(n);
        }

        Ok(0)
    }
}

fn into_io(err: StorageError) -> io::Error {
    match err {
        StorageError::Io(e) => e,
        other => io::Error::other(other),
    }
}
