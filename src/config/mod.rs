//! Process configuration: a flat CLI surface, parsed once at startup into
//! an immutable [`ProxyConfig`]. There is no config file, no hot-reload,
//! and no watcher — the proxy is stateless by design, so its configuration
//! is too.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// MCP observability sidecar: a transparent reverse proxy that derives
/// Prometheus metrics and structured logs from MCP traffic without
/// altering it.
#[derive(Debug, Parser)]
#[command(name = "mcp-observability-proxy", version, about)]
pub struct Cli {
    /// Address the proxy listens on for client traffic.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Address of the upstream MCP server this proxy forwards to.
    #[arg(long)]
    pub target_addr: SocketAddr,

    /// Address the Prometheus `/metrics`, `/healthz`, and `/readyz`
    /// endpoints are served on.
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,

    /// Tracing log level (`error`, `warn`, `info`, `debug`, `trace`).
    /// Overridable per-module with `RUST_LOG`.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// How often the background task dials the upstream to refresh readiness.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub health_check_interval: Duration,

    /// Serve the client-facing listener over TLS.
    #[arg(long)]
    pub tls_enabled: bool,

    /// PEM certificate chain file. Required when `--tls-enabled` is set.
    #[arg(long)]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key file. Required when `--tls-enabled` is set.
    #[arg(long)]
    pub tls_key_file: Option<PathBuf>,

    /// Minimum TLS protocol version to accept.
    #[arg(long, value_enum, default_value_t = TlsMinVersion::V12)]
    pub tls_min_version: TlsMinVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TlsMinVersion {
    #[value(name = "1.2")]
    V12,
    #[value(name = "1.3")]
    V13,
}

/// Immutable, validated configuration built once from [`Cli`] at startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub target_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub health_check_interval: Duration,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub min_version: TlsMinVersion,
}

impl TryFrom<Cli> for ProxyConfig {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let tls = if cli.tls_enabled {
            let cert_file = cli.tls_cert_file.ok_or_else(|| {
                Error::Config("--tls-cert-file is required when --tls-enabled is set".into())
            })?;
            let key_file = cli.tls_key_file.ok_or_else(|| {
                Error::Config("--tls-key-file is required when --tls-enabled is set".into())
            })?;
            Some(TlsConfig {
                cert_file,
                key_file,
                min_version: cli.tls_min_version,
            })
        } else {
            None
        };

        Ok(ProxyConfig {
            listen_addr: cli.listen_addr,
            target_addr: cli.target_addr,
            metrics_addr: cli.metrics_addr,
            log_level: cli.log_level,
            health_check_interval: cli.health_check_interval,
            tls,
        })
    }
}

/// Loads a `rustls::ServerConfig` from the PEM files named in `tls`. A leaf
/// utility — called once at startup, never re-read.
pub fn load_rustls_config(tls: &TlsConfig) -> Result<rustls::ServerConfig> {
    use std::fs::File;
    use std::io::BufReader;

    let cert_file = File::open(&tls.cert_file)
        .map_err(|e| Error::Config(format!("cannot open {}: {e}", tls.cert_file.display())))?;
    let key_file = File::open(&tls.key_file)
        .map_err(|e| Error::Config(format!("cannot open {}: {e}", tls.key_file.display())))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("invalid certificate PEM: {e}")))?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| Error::Config(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| {
            Error::Config(format!("no private key found in {}", tls.key_file.display()))
        })?;

    let versions: &[&rustls::SupportedProtocolVersion] = match tls.min_version {
        TlsMinVersion::V12 => &[&rustls::version::TLS12, &rustls::version::TLS13],
        TlsMinVersion::V13 => &[&rustls::version::TLS13],
    };

    rustls::ServerConfig::builder_with_protocol_versions(versions)
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Config(format!("invalid TLS certificate/key pair: {e}")))
}
