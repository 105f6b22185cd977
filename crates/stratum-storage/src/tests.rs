//! Unit tests for stratum-storage
//!
//! Tests for the framed store, the segmented log, recovery, and the
//! whole-log reader.

use std::io::Read;

use bytes::Bytes;
use tempfile::TempDir;

use crate::{Log, LogConfig, Record, StorageError, Store, LEN_WIDTH};

// ============================================================================
// Store Tests
// ============================================================================

#[test]
fn store_append_returns_frame_width_and_position() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("0.store")).unwrap();

    let (written, position) = store.append(b"hello world").unwrap();
    assert_eq!(written, LEN_WIDTH + 11);
    assert_eq!(position, 0);

    let (written, position) = store.append(b"hello world").unwrap();
    assert_eq!(written, LEN_WIDTH + 11);
    assert_eq!(position, LEN_WIDTH + 11);

    assert_eq!(store.size(), 2 * (LEN_WIDTH + 11));
}

#[test]
fn store_reads_see_buffered_appends() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("0.store")).unwrap();

    // No flush or sync between append and read: the read path drains the
    // buffer itself.
    let (_, position) = store.append(b"buffered").unwrap();
    assert_eq!(store.read(position).unwrap().as_ref(), b"buffered");
}

#[test]
fn store_read_at_returns_raw_frame_bytes() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("0.store")).unwrap();
    store.append(b"hello world").unwrap();

    let mut len_buf = [0u8; LEN_WIDTH as usize];
    let n = store.read_at(&mut len_buf, 0).unwrap();
    assert_eq!(n, LEN_WIDTH as usize);
    assert_eq!(u64::from_be_bytes(len_buf), 11);

    let mut payload = [0u8; 11];
    store.read_at(&mut payload, LEN_WIDTH).unwrap();
    assert_eq!(&payload, b"hello world");
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("0.store");

    let positions: Vec<u64> = {
        let store = Store::open(&path).unwrap();
        let positions = (0..3)
            .map(|_| store.append(b"hello world").unwrap().1)
            .collect();
        store.close().unwrap();
        positions
    };

    let store = Store::open(&path).unwrap();
    assert_eq!(store.size(), 3 * (LEN_WIDTH + 11));
    for position in positions {
        assert_eq!(store.read(position).unwrap().as_ref(), b"hello world");
    }

    // Appends resume at the end of the existing data.
    let (_, position) = store.append(b"tail").unwrap();
    assert_eq!(position, 3 * (LEN_WIDTH + 11));
}

// ============================================================================
// Log Tests
// ============================================================================

fn open_log(dir: &TempDir, config: LogConfig) -> Log {
    Log::open(dir.path(), config).unwrap()
}

#[test]
fn append_and_read_a_record() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    let offset = log.append(Record::new("hello world")).unwrap();
    assert_eq!(offset.as_u64(), 0);

    let record = log.read(offset).unwrap();
    assert_eq!(record.value().as_ref(), b"hello world");
    assert_eq!(record.offset(), offset);
}

#[test]
fn read_past_the_boundary_is_out_of_range() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    let offset = log.append(Record::new("hello world")).unwrap();

    let err = log.read(offset.next()).unwrap_err();
    assert!(matches!(err, StorageError::OffsetOutOfRange { offset } if offset.as_u64() == 1));
}

#[test]
fn read_below_the_initial_offset_is_out_of_range() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig::default().with_initial_offset(10.into());
    let log = open_log(&dir, config);

    let offset = log.append(Record::new("starts high")).unwrap();
    assert_eq!(offset.as_u64(), 10);

    assert!(matches!(
        log.read(5.into()),
        Err(StorageError::OffsetOutOfRange { .. })
    ));
}

#[test]
fn offsets_are_consecutive() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    for want in 0..5u64 {
        let offset = log.append(Record::new("hello world")).unwrap();
        assert_eq!(offset.as_u64(), want);
    }
}

#[test]
fn reopen_recovers_existing_segments() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig::default();

    {
        let log = open_log(&dir, config);
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }
        log.close().unwrap();
    }

    let log = open_log(&dir, config);
    for offset in 0..3u64 {
        let record = log.read(offset.into()).unwrap();
        assert_eq!(record.value().as_ref(), b"hello world");
        assert_eq!(record.offset().as_u64(), offset);
    }

    // The offset sequence continues where it left off.
    let offset = log.append(Record::new("hello world")).unwrap();
    assert_eq!(offset.as_u64(), 3);
}

#[test]
fn roll_over_creates_a_new_segment_and_reads_span_segments() {
    let dir = TempDir::new().unwrap();
    // Every framed record is larger than 32 bytes, so each append maxes the
    // active segment and the next append lands in a fresh one.
    let config = LogConfig::default().with_max_store_bytes(32);
    let log = open_log(&dir, config);

    let first = log.append(Record::new("hello world")).unwrap();
    let second = log.append(Record::new("hello world")).unwrap();
    assert_eq!(second, first.next());

    // The second segment's files are named by its base offset.
    assert!(dir.path().join("1.store").exists());
    assert!(dir.path().join("1.index").exists());

    for offset in [first, second] {
        assert_eq!(log.read(offset).unwrap().value().as_ref(), b"hello world");
    }
}

#[test]
fn reopen_with_a_maxed_active_segment_rolls_before_appending() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig::default().with_max_store_bytes(32);

    {
        let log = open_log(&dir, config);
        log.append(Record::new("hello world")).unwrap();
        log.close().unwrap();
    }

    // Simulate a crash between the maxing append and the roll-over: the
    // empty follow-up segment never made it to disk.
    std::fs::remove_file(dir.path().join("1.store")).unwrap();
    std::fs::remove_file(dir.path().join("1.index")).unwrap();

    let log = open_log(&dir, config);
    let offset = log.append(Record::new("hello world")).unwrap();
    assert_eq!(offset.as_u64(), 1);
    assert_eq!(log.read(offset).unwrap().value().as_ref(), b"hello world");
}

#[test]
fn stray_files_in_the_directory_are_ignored() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("lock"), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a segment").unwrap();

    let config = LogConfig::default();
    {
        let log = open_log(&dir, config);
        log.append(Record::new("hello world")).unwrap();
        log.close().unwrap();
    }

    let log = open_log(&dir, config);
    assert_eq!(log.read(0.into()).unwrap().value().as_ref(), b"hello world");
}

#[test]
fn close_makes_appends_fail_and_reset_recreates_the_log() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    log.append(Record::new("hello world")).unwrap();
    log.close().unwrap();
    assert!(matches!(
        log.append(Record::new("after close")),
        Err(StorageError::Closed)
    ));

    log.reset().unwrap();
    assert!(matches!(
        log.read(0.into()),
        Err(StorageError::OffsetOutOfRange { .. })
    ));

    // The offset space starts over at the initial offset.
    let offset = log.append(Record::new("fresh")).unwrap();
    assert_eq!(offset.as_u64(), 0);
}

// ============================================================================
// Whole-Log Reader Tests
// ============================================================================

#[test]
fn reader_streams_the_raw_framed_record() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    log.append(Record::new("hello world")).unwrap();

    let mut drained = Vec::new();
    log.reader().read_to_end(&mut drained).unwrap();

    // The stream is the store file verbatim: an 8-byte big-endian length
    // followed by the serialized record.
    let frame_len = u64::from_be_bytes(drained[..8].try_into().unwrap()) as usize;
    assert_eq!(drained.len(), 8 + frame_len);

    let record = Record::from_bytes(&drained[8..]).unwrap();
    assert_eq!(record.value().as_ref(), b"hello world");
    assert_eq!(record.offset().as_u64(), 0);
}

#[test]
fn reader_concatenates_all_segments_in_order() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig::default().with_max_store_bytes(32);
    let log = open_log(&dir, config);

    let payloads = ["first", "second", "third"];
    for payload in payloads {
        log.append(Record::new(payload)).unwrap();
    }

    let mut drained = Vec::new();
    log.reader().read_to_end(&mut drained).unwrap();

    // Parse consecutive frames and check every payload comes back in append
    // order across the segment boundaries.
    let mut at = 0;
    for (i, payload) in payloads.iter().enumerate() {
        let frame_len = u64::from_be_bytes(drained[at..at + 8].try_into().unwrap()) as usize;
        let record = Record::from_bytes(&drained[at + 8..at + 8 + frame_len]).unwrap();

        assert_eq!(record.value().as_ref(), payload.as_bytes());
        assert_eq!(record.offset().as_u64(), i as u64);
        at += 8 + frame_len;
    }
    assert_eq!(at, drained.len());
}

#[test]
fn reader_does_not_observe_appends_after_creation() {
    let dir = TempDir::new().unwrap();
    let log = open_log(&dir, LogConfig::default());

    log.append(Record::new("before")).unwrap();
    let mut reader = log.reader();
    log.append(Record::new("after")).unwrap();

    let mut drained = Vec::new();
    reader.read_to_end(&mut drained).unwrap();

    let frame_len = u64::from_be_bytes(drained[..8].try_into().unwrap()) as usize;
    assert_eq!(drained.len(), 8 + frame_len, "snapshot should end after the first frame");

    let record = Record::from_bytes(&drained[8..]).unwrap();
    assert_eq!(record.value().as_ref(), b"before");
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_payload_sequence_reads_back_in_order(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..40)
        ) {
            let dir = TempDir::new().unwrap();
            // A small store cap forces roll-over mid-sequence.
            let log = Log::open(dir.path(), LogConfig::default().with_max_store_bytes(256)).unwrap();

            let mut offsets = Vec::new();
            for payload in &payloads {
                offsets.push(log.append(Record::new(Bytes::from(payload.clone()))).unwrap());
            }

            for (offset, payload) in offsets.iter().zip(&payloads) {
                let record = log.read(*offset).unwrap();
                prop_assert_eq!(record.value().as_ref(), payload.as_slice());
                prop_assert_eq!(record.offset(), *offset);
            }
        }

        #[test]
        fn reopen_preserves_every_record(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..100), 1..20)
        ) {
            let dir = TempDir::new().unwrap();
            let config = LogConfig::default().with_max_store_bytes(256);

            {
                let log = Log::open(dir.path(), config).unwrap();
                for payload in &payloads {
                    log.append(Record::new(Bytes::from(payload.clone()))).unwrap();
                }
                log.close().unwrap();
            }

            let log = Log::open(dir.path(), config).unwrap();
            for (i, payload) in payloads.iter().enumerate() {
                let record = log.read((i as u64).into()).unwrap();
                prop_assert_eq!(record.value().as_ref(), payload.as_slice());
            }
        }
    }
}
