//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::Acl;
use crate::tls::TlsConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Initial read/write buffer size per connection.
    pub buffer_size: usize,
    /// Idle connection timeout; connections with no activity for this
    /// duration are closed. `None` disables the check.
    pub idle_timeout: Option<Duration>,
    /// TLS configuration. Plaintext when unset.
    pub tls: Option<TlsConfig>,
    /// ACL consulted for every produce/consume. When unset, every request
    /// is allowed.
    pub acl: Option<Acl>,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything but the bind
    /// address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1024,
            buffer_size: 64 * 1024,
            idle_timeout: Some(Duration::from_secs(300)),
            tls: None,
            acl: None,
        }
    }

    #[must_use]
    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
