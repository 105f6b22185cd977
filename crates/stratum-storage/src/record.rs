//! Record type for the append-only log.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stratum_types::Offset;

use crate::error::StorageResult;

/// A single record in the log: an opaque payload plus the absolute offset
/// the log assigned to it.
///
/// The payload is whatever bytes the caller handed to
/// [`Log::append`](crate::Log::append); the storage layer never interprets
/// it. The offset is stamped by the owning segment at append time, so the
/// serialized form that lands in the store file carries the record's
/// address with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    offset: Offset,
    value: Bytes,
}

impl Record {
    /// Creates a record awaiting an offset assignment.
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            offset: Offset::ZERO,
            value: value.into(),
        }
    }

    /// Returns the absolute offset assigned to this record.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Returns the payload of this record.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Consumes the record, returning its payload.
    pub fn into_value(self) -> Bytes {
        self.value
    }

    pub(crate) fn set_offset(&mut self, offset: Offset) {
        self.offset = offset;
    }

    /// Serializes the record for storage.
    pub fn to_bytes(&self) -> StorageResult<Bytes> {
        let encoded = bincode::serialize(self)?;
        Ok(Bytes::from(encoded))
    }

    /// Deserializes a record from its stored form.
    pub fn from_bytes(data: &[u8]) -> StorageResult<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_offset_and_value() {
        let mut record = Record::new(Bytes::from("hello world"));
        record.set_offset(Offset::new(7));

        let bytes = record.to_bytes().unwrap();
        let parsed = Record::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.offset(), Offset::new(7));
        assert_eq!(parsed.value().as_ref(), b"hello world");
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let record = Record::new(Bytes::from("some payload"));
        let bytes = record.to_bytes().unwrap();

        let result = Record::from_bytes(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }
}
