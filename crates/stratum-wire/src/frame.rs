//! Frame encoding and decoding for the wire protocol.
//!
//! Every message travels inside one frame: a fixed-size header followed by
//! a variable-size payload. The header carries a CRC32 of the payload so a
//! corrupted or misaligned stream is rejected before message decoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};

/// Protocol magic bytes: "STRM" in big-endian.
pub const MAGIC: u32 = 0x5354_524D;

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Frame header size in bytes (magic + version + length + checksum).
pub const FRAME_HEADER_SIZE: usize = 14;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// A complete frame: validated header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Wraps a payload in a frame.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total encoded size of the frame in bytes.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encodes the frame into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32(MAGIC);
        buf.put_u16(PROTOCOL_VERSION);
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(crc32fast::hash(&self.payload));
        buf.put_slice(&self.payload);
    }

    /// Encodes the frame into a fresh buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` when a complete, valid frame was consumed
    /// from the buffer, `Ok(None)` when more bytes are needed, and `Err`
    /// when the stream is not a valid frame stream.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Self>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut peek = &buf[..FRAME_HEADER_SIZE];
        let magic = peek.get_u32();
        let version = peek.get_u16();
        let length = peek.get_u32();
        let checksum = peek.get_u32();

        if magic != MAGIC {
            return Err(WireError::InvalidMagic(magic));
        }
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        if length > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge {
                size: length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if buf.len() < FRAME_HEADER_SIZE + length as usize {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(length as usize).freeze();

        let actual = crc32fast::hash(&payload);
        if actual != checksum {
            return Err(WireError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }

        Ok(Some(Self { payload }))
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let frame = Frame::new(Bytes::from("hello, world!"));
        let encoded = frame.encode_to_bytes();
        assert_eq!(encoded.len(), FRAME_HEADER_SIZE + 13);

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.payload().as_ref(), b"hello, world!");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_header_needs_more_bytes() {
        let mut buf = BytesMut::from(&[0u8; FRAME_HEADER_SIZE - 1][..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), FRAME_HEADER_SIZE - 1, "nothing consumed");
    }

    #[test]
    fn partial_payload_needs_more_bytes() {
        let encoded = Frame::new(Bytes::from("truncated")).encode_to_bytes();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn two_frames_decode_back_to_back() {
        let mut buf = BytesMut::new();
        Frame::new(Bytes::from("one")).encode(&mut buf);
        Frame::new(Bytes::from("two")).encode(&mut buf);

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload().as_ref(), b"one");
        assert_eq!(second.payload().as_ref(), b"two");
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(0xDEAD_BEEF);
        buf.put_u16(PROTOCOL_VERSION);
        buf.put_u32(0);
        buf.put_u32(0);

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::InvalidMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let encoded = Frame::new(Bytes::from("precious")).encode_to_bytes();
        let mut bytes = encoded.to_vec();
        *bytes.last_mut().unwrap() ^= 0xFF;

        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC);
        buf.put_u16(PROTOCOL_VERSION);
        buf.put_u32(MAX_PAYLOAD_SIZE + 1);
        buf.put_u32(0);

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::PayloadTooLarge { .. })
        ));
    }
}
