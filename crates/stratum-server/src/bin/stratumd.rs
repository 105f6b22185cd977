//! stratumd: the Stratum log server daemon.
//!
//! # Usage
//!
//! ```bash
//! # Serve a log out of ./data on the default port
//! stratumd --data-dir ./data
//!
//! # Custom listen address and segment sizing
//! stratumd --data-dir /var/lib/stratum --listen 0.0.0.0:7420 \
//!     --max-store-bytes 1048576 --max-index-bytes 131072
//!
//! # With an ACL policy and TLS
//! stratumd --data-dir ./data --acl-file policy.csv \
//!     --tls-cert server.pem --tls-key server.key
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use stratum_server::{Acl, Server, ServerConfig, TlsConfig};
use stratum_storage::{Log, LogConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

struct DaemonConfig {
    listen: SocketAddr,
    data_dir: PathBuf,
    acl_file: Option<PathBuf>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    tls_client_ca: Option<PathBuf>,
    max_store_bytes: Option<u64>,
    max_index_bytes: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7420".parse().expect("valid default address"),
            data_dir: PathBuf::from("./stratum-data"),
            acl_file: None,
            tls_cert: None,
            tls_key: None,
            tls_client_ca: None,
            max_store_bytes: None,
            max_index_bytes: None,
        }
    }
}

fn print_usage() {
    println!(
        "stratumd - Stratum commit-log server

USAGE:
    stratumd [OPTIONS]

OPTIONS:
    --listen <addr>            Listen address (default 127.0.0.1:7420)
    --data-dir <path>          Log directory (default ./stratum-data)
    --acl-file <path>          ACL policy file (subject,action per line)
    --tls-cert <path>          TLS certificate chain (PEM)
    --tls-key <path>           TLS private key (PEM)
    --tls-client-ca <path>     Require client certs signed by this CA
    --max-store-bytes <n>      Segment store cap in bytes
    --max-index-bytes <n>      Segment index cap in bytes
    -h, --help                 Print this help"
    );
}

fn parse_args() -> Result<Option<DaemonConfig>, String> {
    let mut config = DaemonConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {name}"))
        };

        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "--listen" => {
                config.listen = value("--listen")?
                    .parse()
                    .map_err(|e| format!("invalid listen address: {e}"))?;
            }
            "--data-dir" => config.data_dir = PathBuf::from(value("--data-dir")?),
            "--acl-file" => config.acl_file = Some(PathBuf::from(value("--acl-file")?)),
            "--tls-cert" => config.tls_cert = Some(PathBuf::from(value("--tls-cert")?)),
            "--tls-key" => config.tls_key = Some(PathBuf::from(value("--tls-key")?)),
            "--tls-client-ca" => {
                config.tls_client_ca = Some(PathBuf::from(value("--tls-client-ca")?));
            }
            "--max-store-bytes" => {
                config.max_store_bytes = Some(
                    value("--max-store-bytes")?
                        .parse()
                        .map_err(|e| format!("invalid --max-store-bytes: {e}"))?,
                );
            }
            "--max-index-bytes" => {
                config.max_index_bytes = Some(
                    value("--max-index-bytes")?
                        .parse()
                        .map_err(|e| format!("invalid --max-index-bytes: {e}"))?,
                );
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if config.tls_cert.is_some() != config.tls_key.is_some() {
        return Err("--tls-cert and --tls-key must be given together".to_string());
    }

    Ok(Some(config))
}

fn run(config: DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut log_config = LogConfig::default();
    if let Some(bytes) = config.max_store_bytes {
        log_config = log_config.with_max_store_bytes(bytes);
    }
    if let Some(bytes) = config.max_index_bytes {
        log_config = log_config.with_max_index_bytes(bytes);
    }

    let log = Arc::new(Log::open(&config.data_dir, log_config)?);

    let mut server_config = ServerConfig::new(config.listen);

    if let Some(path) = &config.acl_file {
        server_config = server_config.with_acl(Acl::from_policy_file(path)?);
    }

    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        let mut tls = TlsConfig::new(cert, key);
        if let Some(ca) = &config.tls_client_ca {
            tls = tls.with_client_auth(ca);
        }
        server_config = server_config.with_tls(tls);
    }

    let mut server = Server::new(server_config, Arc::clone(&log))?;
    let result = server.run();

    log.close()?;
    Ok(result?)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match parse_args() {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("try `stratumd --help`");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
