//! TLS configuration for server connections.
//!
//! Builds a rustls `ServerConfig` from PEM files. The per-connection TLS
//! state lives in [`Connection`](crate::connection::Connection), which feeds
//! the non-blocking socket through `rustls::ServerConnection`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::error::{ServerError, ServerResult};

/// TLS configuration for the server.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the certificate chain file (PEM format).
    pub cert_path: PathBuf,
    /// Path to the private key file (PEM format).
    pub key_path: PathBuf,
    /// Whether to require client certificates (mTLS).
    pub require_client_cert: bool,
    /// CA certificate clients must chain to when mTLS is on.
    pub ca_cert_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Creates a new TLS configuration.
    pub fn new(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_path_buf(),
            key_path: key_path.as_ref().to_path_buf(),
            require_client_cert: false,
            ca_cert_path: None,
        }
    }

    /// Enables mutual TLS against the given CA.
    #[must_use]
    pub fn with_client_auth(mut self, ca_cert_path: impl AsRef<Path>) -> Self {
        self.require_client_cert = true;
        self.ca_cert_path = Some(ca_cert_path.as_ref().to_path_buf());
        self
    }

    /// Builds a rustls `ServerConfig` from this configuration.
    pub fn build_server_config(&self) -> ServerResult<Arc<ServerConfig>> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_private_key(&self.key_path)?;

        let builder = if self.require_client_cert {
            let ca_path = self.ca_cert_path.as_ref().ok_or_else(|| {
                ServerError::Tls("client auth requires a CA certificate".to_string())
            })?;

            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .map_err(|e| ServerError::Tls(format!("invalid CA certificate: {e}")))?;
            }

            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| ServerError::Tls(format!("client verifier: {e}")))?;

            ServerConfig::builder().with_client_cert_verifier(verifier)
        } else {
            ServerConfig::builder().with_no_client_auth()
        };

        let config = builder
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?;

        Ok(Arc::new(config))
    }
}

/// Loads certificates from a PEM file.
fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        ServerError::Tls(format!(
            "failed to open certificate file {}: {e}",
            path.display()
        ))
    })?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(Result::ok)
        .collect();

    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_private_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("failed to open key file {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Ok(Some(_)) => {
                // Skip non-key items such as certificates.
            }
            Ok(None) => break,
            Err(e) => {
                return Err(ServerError::Tls(format!(
                    "failed to parse key file {}: {e}",
                    path.display()
                )));
            }
        }
    }

    Err(ServerError::Tls(format!(
        "no private key found in {}",
        path.display()
    )))
}

#[cfg(test)]
mod tls_tests {
    use super::*;

    #[test]
    fn config_builder_records_paths() {
        let config = TlsConfig::new("/pki/server.pem", "/pki/server.key");
        assert_eq!(config.cert_path.to_str(), Some("/pki/server.pem"));
        assert_eq!(config.key_path.to_str(), Some("/pki/server.key"));
        assert!(!config.require_client_cert);
        assert!(config.ca_cert_path.is_none());
    }

    #[test]
    fn client_auth_requires_a_ca() {
        let config = TlsConfig::new("/pki/server.pem", "/pki/server.key").with_client_auth("/pki/ca.pem");
        assert!(config.require_client_cert);
        assert_eq!(
            config.ca_cert_path.as_ref().and_then(|p| p.to_str()),
            Some("/pki/ca.pem")
        );
    }

    #[test]
    fn missing_certificate_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TlsConfig::new(dir.path().join("absent.pem"), dir.path().join("absent.key"));

        assert!(matches!(
            config.build_server_config(),
            Err(ServerError::Tls(_))
        ));
    }

    #[test]
    fn certificate_file_without_certs_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let cert_path = dir.path().join("empty.pem");
        std::fs::write(&cert_path, "not a certificate\n").unwrap();

        let config = TlsConfig::new(&cert_path, dir.path().join("absent.key"));
        assert!(matches!(
            config.build_server_config(),
            Err(ServerError::Tls(_))
        ));
    }
}
