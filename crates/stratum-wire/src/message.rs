//! Request and response message types for the produce/consume protocol.
//!
//! Messages are serialized with bincode and travel one per frame. A
//! `ConsumeStream` request is the only one answered by more than one frame:
//! the server sends a `Consume` response per record and finishes with
//! `EndOfStream`, all sharing the request id.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stratum_types::Offset;

use crate::error::WireResult;
use crate::frame::Frame;

/// Unique identifier for a request, used to match responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A client request to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier.
    pub id: RequestId,
    /// The request payload.
    pub payload: RequestPayload,
}

impl Request {
    pub fn new(id: RequestId, payload: RequestPayload) -> Self {
        Self { id, payload }
    }

    /// Encodes the request to a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = bincode::serialize(self)?;
        Ok(Frame::new(Bytes::from(payload)))
    }

    /// Decodes a request from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(bincode::deserialize(frame.payload())?)
    }
}

/// Request payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
    /// Establish the connection: version check plus the identity the ACL
    /// authorizes against.
    Handshake(HandshakeRequest),
    /// Append one record to the log.
    Produce(ProduceRequest),
    /// Read the record at an offset.
    Consume(ConsumeRequest),
    /// Read every record from an offset to the current tail.
    ConsumeStream(ConsumeStreamRequest),
}

/// Handshake request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Client protocol version.
    pub client_version: u16,
    /// Subject the connection acts as; consulted by the server's ACL.
    pub identity: Option<String>,
}

/// Produce request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProduceRequest {
    /// Record payload to append.
    pub value: Vec<u8>,
}

/// Consume request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsumeRequest {
    /// Absolute offset to read.
    pub offset: Offset,
}

/// Consume-stream request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsumeStreamRequest {
    /// First offset to read (inclusive).
    pub from_offset: Offset,
}

// ============================================================================
// Responses
// ============================================================================

/// A server response to a client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request id this is responding to.
    pub request_id: RequestId,
    /// The response payload.
    pub payload: ResponsePayload,
}

impl Response {
    pub fn new(request_id: RequestId, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Creates an error response.
    pub fn error(request_id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: ResponsePayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        }
    }

    /// Encodes the response to a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = bincode::serialize(self)?;
        Ok(Frame::new(Bytes::from(payload)))
    }

    /// Decodes a response from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        Ok(bincode::deserialize(frame.payload())?)
    }
}

/// Response payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Error response.
    Error(ErrorResponse),
    /// Handshake response.
    Handshake(HandshakeResponse),
    /// Produce response.
    Produce(ProduceResponse),
    /// One consumed record.
    Consume(ConsumeResponse),
    /// Terminates a `ConsumeStream` response sequence.
    EndOfStream,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Error codes carried on the wire.
///
/// `OffsetOutOfRange` is the only code with storage-level meaning; clients
/// use it to tell "not produced yet" from real failures. Everything else is
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 0,
    InternalError = 1,
    InvalidRequest = 2,
    Unauthorized = 3,
    OffsetOutOfRange = 4,
}

/// Handshake response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Server protocol version.
    pub server_version: u16,
    /// The subject the server bound to this connection.
    pub subject: Option<String>,
}

/// Produce response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProduceResponse {
    /// Offset assigned to the appended record.
    pub offset: Offset,
}

/// Consume response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResponse {
    /// Absolute offset of the record.
    pub offset: Offset,
    /// Record payload.
    pub value: Vec<u8>,
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn request_roundtrip_through_frame() {
        let request = Request::new(
            RequestId::new(7),
            RequestPayload::Produce(ProduceRequest {
                value: b"hello world".to_vec(),
            }),
        );

        let frame = request.to_frame().unwrap();
        let decoded = Request::from_frame(&frame).unwrap();

        assert_eq!(decoded.id, request.id);
        match decoded.payload {
            RequestPayload::Produce(p) => assert_eq!(p.value, b"hello world"),
            other => panic!("expected Produce, got {other:?}"),
        }
    }

    #[test]
    fn response_roundtrip_through_frame() {
        let response = Response::new(
            RequestId::new(3),
            ResponsePayload::Consume(ConsumeResponse {
                offset: Offset::new(42),
                value: b"payload".to_vec(),
            }),
        );

        let frame = response.to_frame().unwrap();
        let decoded = Response::from_frame(&frame).unwrap();

        assert_eq!(decoded.request_id, response.request_id);
        match decoded.payload {
            ResponsePayload::Consume(c) => {
                assert_eq!(c.offset, Offset::new(42));
                assert_eq!(c.value, b"payload");
            }
            other => panic!("expected Consume, got {other:?}"),
        }
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let response = Response::error(
            RequestId::new(1),
            ErrorCode::OffsetOutOfRange,
            "offset out of range: 9",
        );

        let frame = response.to_frame().unwrap();
        let decoded = Response::from_frame(&frame).unwrap();

        match decoded.payload {
            ResponsePayload::Error(e) => {
                assert_eq!(e.code, ErrorCode::OffsetOutOfRange);
                assert_eq!(e.message, "offset out of range: 9");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn end_of_stream_is_a_bare_marker() {
        let response = Response::new(RequestId::new(5), ResponsePayload::EndOfStream);
        let decoded = Response::from_frame(&response.to_frame().unwrap()).unwrap();
        assert!(matches!(decoded.payload, ResponsePayload::EndOfStream));
    }
}
