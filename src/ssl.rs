//! TLS support for ClickHouse connections, as an opaque transport wrapper.
//!
//! This module is only available when the `tls` feature is enabled.

use rustls::{
    client::{
        ServerCertVerified,
        ServerCertVerifier,
    },
    Certificate,
    ClientConfig,
    RootCertStore,
    ServerName,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::{
    connection::Stream,
    Error,
    Result,
};

/// TLS configuration options.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    /// Path to a PEM CA certificate file; system roots are used otherwise.
    pub ca_certificate: Option<PathBuf>,
    /// Skip certificate verification (insecure, for test servers only).
    pub allow_insecure: bool,
    /// Server name for SNI when it differs from the connect host.
    pub server_name: Option<String>,
}

impl TlsOptions {
    /// Create default options: system roots, verification on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a PEM CA certificate file instead of the system roots.
    pub fn ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    /// Skip certificate verification.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Override the SNI server name.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    fn build_config(&self) -> Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();

        if let Some(path) = &self.ca_certificate {
            let pem = std::fs::File::open(path).map_err(|e| {
                Error::Connection(format!(
                    "Cannot open CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let mut reader = std::io::BufReader::new(pem);
            let certs =
                rustls_pemfile::certs(&mut reader).map_err(|e| {
                    Error::Connection(format!(
                        "Cannot parse CA certificate: {}",
                        e
                    ))
                })?;
            for cert in certs {
                roots.add(&Certificate(cert)).map_err(|e| {
                    Error::Connection(format!(
                        "Cannot add CA certificate: {}",
                        e
                    ))
                })?;
            }
        } else {
            let native = rustls_native_certs::load_native_certs()
                .map_err(|e| {
                    Error::Connection(format!(
                        "Cannot load system certificates: {}",
                        e
                    ))
                })?;
            for cert in native {
                let _ = roots.add(&Certificate(cert.0));
            }
        }

        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let mut config = config;
        if self.allow_insecure {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(AcceptAnyCert));
        }

        Ok(Arc::new(config))
    }

    /// Wrap an established TCP stream in a TLS session.
    pub async fn wrap(
        &self,
        stream: TcpStream,
        host: &str,
    ) -> Result<Box<dyn Stream>> {
        let config = self.build_config()?;
        let connector = TlsConnector::from(config);
        let name = self.server_name.as_deref().unwrap_or(host);
        let server_name =
            ServerName::try_from(name).map_err(|e| {
                Error::Connection(format!(
                    "Invalid TLS server name '{}': {}",
                    name, e
                ))
            })?;
        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| {
                Error::Connection(format!("TLS handshake failed: {}", e))
            })?;
        Ok(Box::new(tls))
    }
}

/// Verifier that accepts any certificate, used with `allow_insecure`.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = TlsOptions::new()
            .allow_insecure(true)
            .server_name("clickhouse.internal");
        assert!(options.allow_insecure);
        assert_eq!(
            options.server_name.as_deref(),
            Some("clickhouse.internal")
        );
        assert!(options.ca_certificate.is_none());
    }

    #[test]
    fn test_missing_ca_file_fails() {
        let options =
            TlsOptions::new().ca_certificate("/nonexistent/ca.pem");
        assert!(options.build_config().is_err());
    }
}
