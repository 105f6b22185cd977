//! RPC client for Stratum.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, RootCertStore, StreamOwned};
use stratum_types::Offset;
use stratum_wire::{
    ConsumeRequest, ConsumeResponse, ConsumeStreamRequest, Frame, HandshakeRequest,
    ProduceRequest, Request, RequestId, RequestPayload, Response, ResponsePayload,
    PROTOCOL_VERSION,
};

use crate::error::{ClientError, ClientResult};

/// Configuration for the client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Read timeout on the socket.
    pub read_timeout: Option<Duration>,
    /// Write timeout on the socket.
    pub write_timeout: Option<Duration>,
    /// Subject presented at handshake; the server's ACL authorizes against
    /// it.
    pub identity: Option<String>,
    /// TLS configuration. Plaintext when unset.
    pub tls: Option<ClientTlsConfig>,
}

impl ClientConfig {
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// TLS settings for connecting to a TLS-enabled server.
#[derive(Debug, Clone)]
pub struct ClientTlsConfig {
    /// CA certificate (PEM) the server certificate must chain to.
    pub ca_cert_path: PathBuf,
    /// Name to verify the server certificate against.
    pub server_name: String,
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Transport {
    fn io(&mut self) -> &mut dyn ReadWrite {
        match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => stream.as_mut(),
        }
    }
}

trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

/// Synchronous RPC client for a Stratum server.
///
/// # Example
///
/// ```ignore
/// use stratum_client::{Client, ClientConfig};
///
/// let mut client = Client::connect(
///     "127.0.0.1:7420",
///     ClientConfig::default().with_identity("root"),
/// )?;
///
/// let offset = client.produce(b"hello world".to_vec())?;
/// let record = client.consume(offset)?;
/// assert_eq!(record.value, b"hello world");
/// ```
pub struct Client {
    transport: Transport,
    next_request_id: u64,
    read_buf: BytesMut,
}

impl Client {
    /// Connects to a server and performs the handshake.
    pub fn connect(addr: impl ToSocketAddrs, config: ClientConfig) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        stream.set_nodelay(true)?;

        let transport = match &config.tls {
            Some(tls) => Transport::Tls(Box::new(tls_stream(stream, tls)?)),
            None => Transport::Plain(stream),
        };

        let mut client = Self {
            transport,
            next_request_id: 1,
            read_buf: BytesMut::with_capacity(64 * 1024),
        };

        client.handshake(config.identity)?;
        Ok(client)
    }

    fn handshake(&mut self, identity: Option<String>) -> ClientResult<()> {
        let response = self.send_request(RequestPayload::Handshake(HandshakeRequest {
            client_version: PROTOCOL_VERSION,
            identity,
        }))?;

        match response.payload {
            ResponsePayload::Handshake(h) => {
                if h.server_version != PROTOCOL_VERSION {
                    return Err(ClientError::HandshakeFailed(format!(
                        "protocol version mismatch: client {}, server {}",
                        PROTOCOL_VERSION, h.server_version
                    )));
                }
                Ok(())
            }
            ResponsePayload::Error(e) => Err(e.into()),
            other => Err(unexpected("Handshake", &other)),
        }
    }

    /// Appends one record, returning its assigned offset.
    pub fn produce(&mut self, value: Vec<u8>) -> ClientResult<Offset> {
        let response = self.send_request(RequestPayload::Produce(ProduceRequest { value }))?;

        match response.payload {
            ResponsePayload::Produce(p) => Ok(p.offset),
            ResponsePayload::Error(e) => Err(e.into()),
            other => Err(unexpected("Produce", &other)),
        }
    }

    /// Reads the record at `offset`.
    pub fn consume(&mut self, offset: Offset) -> ClientResult<ConsumeResponse> {
        let response = self.send_request(RequestPayload::Consume(ConsumeRequest { offset }))?;

        match response.payload {
            ResponsePayload::Consume(c) => Ok(c),
            ResponsePayload::Error(e) => Err(e.into()),
            other => Err(unexpected("Consume", &other)),
        }
    }

    /// Reads every record from `from_offset` to the log's tail at the time
    /// the server handles the request.
    pub fn consume_stream(&mut self, from_offset: Offset) -> ClientResult<Vec<ConsumeResponse>> {
        let id = self.send(RequestPayload::ConsumeStream(ConsumeStreamRequest {
            from_offset,
        }))?;

        let mut records = Vec::new();
        loop {
            let response = self.read_response(id)?;
            match response.payload {
                ResponsePayload::Consume(c) => records.push(c),
                ResponsePayload::EndOfStream => return Ok(records),
                ResponsePayload::Error(e) => return Err(e.into()),
                other => return Err(unexpected("Consume or EndOfStream", &other)),
            }
        }
    }

    fn send_request(&mut self, payload: RequestPayload) -> ClientResult<Response> {
        let id = self.send(payload)?;
        self.read_response(id)
    }

    fn send(&mut self, payload: RequestPayload) -> ClientResult<RequestId> {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        let frame = Request::new(id, payload).to_frame()?;
        let encoded = frame.encode_to_bytes();

        let io = self.transport.io();
        io.write_all(&encoded)?;
        io.flush()?;

        Ok(id)
    }

    fn read_response(&mut self, id: RequestId) -> ClientResult<Response> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                let response = Response::from_frame(&frame)?;
                if response.request_id != id {
                    return Err(ClientError::UnexpectedResponse {
                        expected: "matching request id",
                        actual: format!("id {:?}", response.request_id),
                    });
                }
                return Ok(response);
            }

            let mut chunk = [0u8; 4096];
            let n = self.transport.io().read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn unexpected(expected: &'static str, actual: &ResponsePayload) -> ClientError {
    ClientError::UnexpectedResponse {
        expected,
        actual: format!("{actual:?}"),
    }
}

fn tls_stream(
    stream: TcpStream,
    tls: &ClientTlsConfig,
) -> ClientResult<StreamOwned<ClientConnection, TcpStream>> {
    let file = File::open(&tls.ca_cert_path).map_err(|e| {
        ClientError::Tls(format!(
            "failed to open CA file {}: {e}",
            tls.ca_cert_path.display()
        ))
    })?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)).filter_map(Result::ok) {
        roots
            .add(cert)
            .map_err(|e| ClientError::Tls(format!("invalid CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(ClientError::Tls(format!(
            "no CA certificates found in {}",
            tls.ca_cert_path.display()
        )));
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(tls.server_name.clone())
        .map_err(|e| ClientError::Tls(format!("invalid server name: {e}")))?;

    let conn = Arc::new(config);
    let conn = ClientConnection::new(conn, server_name)
        .map_err(|e| ClientError::Tls(format!("failed to create TLS connection: {e}")))?;

    Ok(StreamOwned::new(conn, stream))
}
