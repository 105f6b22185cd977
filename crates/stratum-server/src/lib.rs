//! # stratum-server: Stratum server daemon
//!
//! This crate provides the TCP server that exposes a Stratum log over the
//! binary wire protocol defined in `stratum-wire`.
//!
//! ## Architecture
//!
//! The server uses mio for non-blocking I/O with a poll-based event loop;
//! control flow stays explicit, with no async runtime.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      stratum-server                      │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────────┐  │
//! │  │  Listener  │ → │ Connections │ → │ RequestHandler │  │
//! │  │  (TCP/TLS) │   │ (mio poll)  │   │  (ACL → Log)   │  │
//! │  └────────────┘   └─────────────┘   └────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratum_server::{Server, ServerConfig};
//! use stratum_storage::{Log, LogConfig};
//!
//! let log = Arc::new(Log::open("./data", LogConfig::default())?);
//! let config = ServerConfig::new("127.0.0.1:7420".parse()?);
//! let mut server = Server::new(config, log)?;
//! server.run()?;
//! ```

mod auth;
mod config;
mod connection;
mod error;
mod handler;
mod server;
mod tls;

pub use auth::{Acl, Action};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownHandle};
pub use tls::TlsConfig;
