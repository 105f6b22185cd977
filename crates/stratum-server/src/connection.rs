//! Connection state management.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use mio::net::TcpStream;
use mio::Interest;
use rustls::ServerConnection;

use stratum_wire::{Frame, Request, Response, FRAME_HEADER_SIZE};

use crate::error::ServerResult;

/// State of a client connection.
pub struct Connection {
    /// TCP stream.
    pub stream: TcpStream,
    /// TLS state when the server runs with TLS; plaintext otherwise.
    tls: Option<ServerConnection>,
    /// Decrypted inbound bytes awaiting frame decoding.
    read_buf: BytesMut,
    /// Outbound bytes awaiting the socket (or the TLS state machine).
    write_buf: BytesMut,
    /// Whether the connection is shutting down.
    pub closing: bool,
    /// Last activity timestamp for idle tracking.
    last_activity: Instant,
    /// Identity presented at handshake; consulted by the ACL.
    pub subject: Option<String>,
}

impl Connection {
    /// Creates a plaintext connection.
    pub fn new(stream: TcpStream, buffer_size: usize) -> Self {
        Self {
            stream,
            tls: None,
            read_buf: BytesMut::with_capacity(buffer_size),
            write_buf: BytesMut::with_capacity(buffer_size),
            closing: false,
            last_activity: Instant::now(),
            subject: None,
        }
    }

    /// Creates a connection that negotiates TLS before framing.
    pub fn with_tls(
        stream: TcpStream,
        buffer_size: usize,
        config: Arc<rustls::ServerConfig>,
    ) -> ServerResult<Self> {
        let conn = ServerConnection::new(config)
            .map_err(|e| crate::error::ServerError::Tls(e.to_string()))?;

        let mut connection = Self::new(stream, buffer_size);
        connection.tls = Some(conn);
        Ok(connection)
    }

    /// Updates the last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the connection has been idle longer than `timeout`.
    pub fn is_idle(&self, timeout: std::time::Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Reads from the socket into the read buffer, decrypting when TLS is
    /// on.
    ///
    /// Returns `Ok(true)` while the connection remains open.
    pub fn read(&mut self) -> io::Result<bool> {
        match &mut self.tls {
            None => {
                let mut chunk = [0u8; 4096];
                loop {
                    match self.stream.read(&mut chunk) {
                        Ok(0) => return Ok(false),
                        Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                        Err(e) => return Err(e),
                    }
                }
            }
            Some(conn) => loop {
                match conn.read_tls(&mut self.stream) {
                    Ok(0) => return Ok(false),
                    Ok(_) => {
                        let state = conn
                            .process_new_packets()
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

                        let pending = state.plaintext_bytes_to_read();
                        if pending > 0 {
                            let start = self.read_buf.len();
                            self.read_buf.resize(start + pending, 0);
                            conn.reader().read_exact(&mut self.read_buf[start..])?;
                        }

                        if state.peer_has_closed() {
                            return Ok(false);
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                    Err(e) => return Err(e),
                }
            },
        }
    }

    /// Writes pending data to the socket, encrypting when TLS is on.
    ///
    /// Returns `Ok(true)` once everything queued so far has been written.
    pub fn write(&mut self) -> io::Result<bool> {
        match &mut self.tls {
            None => {
                while !self.write_buf.is_empty() {
                    match self.stream.write(&self.write_buf) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "failed to write to socket",
                            ));
                        }
                        Ok(n) => {
                            let _ = self.write_buf.split_to(n);
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                        Err(e) => return Err(e),
                    }
                }
                Ok(true)
            }
            Some(conn) => {
                // Hand queued plaintext to the TLS state machine; it buffers
                // internally until the handshake allows application data.
                while !self.write_buf.is_empty() {
                    match conn.writer().write(&self.write_buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let _ = self.write_buf.split_to(n);
                        }
                        Err(e) => return Err(e),
                    }
                }

                while conn.wants_write() {
                    match conn.write_tls(&mut self.stream) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "failed to write to socket",
                            ));
                        }
                        Ok(_) => {}
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                        Err(e) => return Err(e),
                    }
                }

                Ok(self.write_buf.is_empty())
            }
        }
    }

    /// Attempts to decode one request from the read buffer.
    pub fn try_decode_request(&mut self) -> ServerResult<Option<Request>> {
        match Frame::decode(&mut self.read_buf)? {
            Some(frame) => Ok(Some(Request::from_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Queues a response for writing.
    pub fn queue_response(&mut self, response: &Response) -> ServerResult<()> {
        let frame = response.to_frame()?;
        frame.encode(&mut self.write_buf);
        Ok(())
    }

    /// Interest flags for the poll registry.
    pub fn interest(&self) -> Interest {
        let wants_write = !self.write_buf.is_empty()
            || self.tls.as_ref().is_some_and(|tls| tls.wants_write());

        if wants_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Whether enough bytes are buffered to possibly hold a frame.
    pub fn has_pending_data(&self) -> bool {
        self.read_buf.len() >= FRAME_HEADER_SIZE
    }
}
