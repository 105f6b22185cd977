//! # stratum-wire: Binary wire protocol for Stratum
//!
//! The produce/consume RPC surface speaks length-delimited, CRC-checked
//! frames over TCP. Each frame carries one bincode-encoded message.
//!
//! ```text
//! ┌───────────┬──────────────┬─────────────┬───────────────┬─────────┐
//! │ magic u32 │ version u16  │ length u32  │ checksum u32  │ payload │
//! └───────────┴──────────────┴─────────────┴───────────────┴─────────┘
//! ```
//!
//! Both sides of the connection share this crate: the server decodes
//! [`Request`] frames and encodes [`Response`] frames, the client does the
//! reverse.

mod error;
mod frame;
mod message;

pub use error::{WireError, WireResult};
pub use frame::{Frame, FRAME_HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
pub use message::{
    ConsumeRequest, ConsumeResponse, ConsumeStreamRequest, ErrorCode, ErrorResponse,
    HandshakeRequest, HandshakeResponse, ProduceRequest, ProduceResponse, Request, RequestId,
    RequestPayload, Response, ResponsePayload,
};
