//! TCP server implementation using mio for non-blocking I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use stratum_storage::Log;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;

/// Token for the listener socket.
const LISTENER_TOKEN: Token = Token(0);

/// Maximum events to process per poll iteration.
const MAX_EVENTS: usize = 1024;

/// How often the run loop checks the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle for requesting a running server to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Asks the server's run loop to exit after its current iteration.
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// TCP server exposing a [`Log`] over the Stratum wire protocol.
///
/// Uses mio's poll-based event loop to serve many connections without an
/// async runtime: the listener and every connection are registered with one
/// poll, and requests are handled inline as their frames complete.
pub struct Server {
    config: ServerConfig,
    poll: Poll,
    listener: TcpListener,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    connections: HashMap<Token, Connection>,
    handler: RequestHandler,
    next_token: usize,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Creates a new server over the given log.
    pub fn new(config: ServerConfig, log: Arc<Log>) -> ServerResult<Self> {
        let poll = Poll::new()?;

        let addr = config.bind_addr;
        let mut listener =
            TcpListener::bind(addr).map_err(|e| ServerError::BindFailed { addr, source: e })?;

        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let tls_config = match &config.tls {
            Some(tls) => Some(tls.build_server_config()?),
            None => None,
        };

        let handler = RequestHandler::new(log, config.acl.clone());

        info!(
            %addr,
            tls = tls_config.is_some(),
            authorized = config.acl.is_some(),
            "server listening"
        );

        Ok(Self {
            config,
            poll,
            listener,
            tls_config,
            connections: HashMap::new(),
            handler,
            next_token: 1, // 0 is LISTENER_TOKEN
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a handle that can stop [`Server::run`] from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Runs the server event loop until shut down.
    pub fn run(&mut self) -> ServerResult<()> {
        info!("server event loop started");

        while !self.shutdown.load(Ordering::Relaxed) {
            self.poll_once(Some(POLL_INTERVAL))?;
        }

        info!("server event loop stopped");
        Ok(())
    }

    /// Runs a single iteration of the event loop.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> ServerResult<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);

        if let Err(e) = self.poll.poll(&mut events, timeout) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e.into());
        }

        for event in &events {
            match event.token() {
                LISTENER_TOKEN => self.accept_connections()?,
                token => {
                    if event.is_readable() {
                        self.handle_readable(token)?;
                    }
                    if event.is_writable() {
                        self.handle_writable(token)?;
                    }
                }
            }
        }

        self.cleanup_closed();
        Ok(())
    }

    /// Accepts new connections from the listener.
    fn accept_connections(&mut self) -> ServerResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!(%addr, "max connections reached, rejecting connection");
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;

                    let conn = match &self.tls_config {
                        Some(tls) => {
                            match Connection::with_tls(stream, self.config.buffer_size, Arc::clone(tls))
                            {
                                Ok(conn) => conn,
                                Err(e) => {
                                    error!(%addr, error = %e, "failed to start TLS connection");
                                    continue;
                                }
                            }
                        }
                        None => Connection::new(stream, self.config.buffer_size),
                    };
                    self.connections.insert(token, conn);

                    debug!(%addr, ?token, "accepted connection");
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handles readable events on a connection.
    fn handle_readable(&mut self, token: Token) -> ServerResult<()> {
        let Some(conn) = self.connections.get_mut(&token) else {
            warn!(?token, "readable event for unknown token");
            return Ok(());
        };

        conn.touch();

        match conn.read() {
            Ok(true) => self.process_requests(token),
            Ok(false) => {
                debug!(?token, "connection closed by peer");
                conn.closing = true;
            }
            Err(e) => {
                error!(?token, error = %e, "error reading from connection");
                conn.closing = true;
            }
        }

        self.update_interest(token)
    }

    /// Handles writable events on a connection.
    fn handle_writable(&mut self, token: Token) -> ServerResult<()> {
        let Some(conn) = self.connections.get_mut(&token) else {
            warn!(?token, "writable event for unknown token");
            return Ok(());
        };

        match conn.write() {
            Ok(true) => trace!(?token, "all data written"),
            Ok(false) => trace!(?token, "more data to write"),
            Err(e) => {
                error!(?token, error = %e, "error writing to connection");
                conn.closing = true;
            }
        }

        self.update_interest(token)
    }

    /// Decodes and handles every complete request buffered on a connection.
    fn process_requests(&mut self, token: Token) {
        loop {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };

            if !conn.has_pending_data() {
                break;
            }

            match conn.try_decode_request() {
                Ok(Some(request)) => {
                    trace!(?token, id = ?request.id, "received request");

                    // The handshake binds the connection's subject; every
                    // later authorization decision uses it.
                    if let stratum_wire::RequestPayload::Handshake(h) = &request.payload {
                        conn.subject = h.identity.clone();
                    }
                    let subject = conn.subject.clone();

                    let responses = self.handler.handle(request, subject.as_deref());

                    if let Some(conn) = self.connections.get_mut(&token) {
                        for response in &responses {
                            if let Err(e) = conn.queue_response(response) {
                                error!(?token, error = %e, "error encoding response");
                                conn.closing = true;
                                break;
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(?token, error = %e, "error decoding request");
                    if let Some(conn) = self.connections.get_mut(&token) {
                        conn.closing = true;
                    }
                    break;
                }
            }
        }
    }

    /// Re-registers a connection with the interest its buffers imply.
    fn update_interest(&mut self, token: Token) -> ServerResult<()> {
        let Some(conn) = self.connections.get_mut(&token) else {
            return Ok(());
        };

        let interest = conn.interest();
        self.poll
            .registry()
            .reregister(&mut conn.stream, token, interest)?;

        Ok(())
    }

    /// Drops connections that are closing or have idled out.
    fn cleanup_closed(&mut self) {
        let idle_timeout = self.config.idle_timeout;

        let to_close: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, c)| c.closing || idle_timeout.is_some_and(|t| c.is_idle(t)))
            .map(|(t, _)| *t)
            .collect();

        for token in to_close {
            if let Some(mut conn) = self.connections.remove(&token) {
                debug!(?token, closing = conn.closing, "closing connection");
                let _ = self.poll.registry().deregister(&mut conn.stream);
            }
        }
    }

    /// Returns the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
