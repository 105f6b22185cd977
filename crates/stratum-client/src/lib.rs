//! # stratum-client: RPC client for Stratum
//!
//! A synchronous client for the Stratum produce/consume protocol. One
//! request is in flight at a time per client; responses are matched by
//! request id.

mod client;
mod error;

pub use client::{Client, ClientConfig, ClientTlsConfig};
pub use error::{ClientError, ClientResult};
