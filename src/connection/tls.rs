//! TLS configuration for both legs of the proxy.
//!
//! The client leg terminates TLS with [`ServerTlsConfig`] (the proxy's certificate and
//! key). The backend leg originates TLS with [`BackendTlsConfig`], whose trust policy
//! is either full verification or skip-verify.

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Trust policy for TLS connections to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendTlsMode {
    /// Server certificate must chain to a trusted root and match the server name
    #[default]
    Verify,
    /// Any certificate is accepted (development only)
    SkipVerify,
}

impl BackendTlsMode {
    /// Whether this mode verifies the backend certificate
    pub fn verifies(&self) -> bool {
        matches!(self, Self::Verify)
    }
}

impl std::fmt::Display for BackendTlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verify => write!(f, "verify"),
            Self::SkipVerify => write!(f, "skip-verify"),
        }
    }
}

impl std::str::FromStr for BackendTlsMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "verify" => Ok(Self::Verify),
            "skip-verify" => Ok(Self::SkipVerify),
            _ => Err(Error::Config(format!(
                "invalid backend TLS mode '{}': expected verify or skip-verify",
                s
            ))),
        }
    }
}

/// Client-side TLS configuration used when connecting to the backend.
///
/// # Examples
///
/// ```ignore
/// use pg_tls_proxy::connection::{BackendTlsConfig, BackendTlsMode};
///
/// // System roots, full verification
/// let tls = BackendTlsConfig::builder().build()?;
///
/// // Private CA
/// let tls = BackendTlsConfig::builder()
///     .ca_cert_path("/etc/pg-tls-proxy/ca.pem")
///     .build()?;
///
/// // Self-signed backend in development
/// let tls = BackendTlsConfig::builder()
///     .mode(BackendTlsMode::SkipVerify)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct BackendTlsConfig {
    mode: BackendTlsMode,
    ca_cert_path: Option<PathBuf>,
    client_config: Arc<ClientConfig>,
}

impl BackendTlsConfig {
    /// Create a new builder.
    pub fn builder() -> BackendTlsConfigBuilder {
        BackendTlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this policy.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Trust policy in effect.
    pub fn mode(&self) -> BackendTlsMode {
        self.mode
    }
}

impl std::fmt::Debug for BackendTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendTlsConfig")
            .field("mode", &self.mode)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for [`BackendTlsConfig`].
#[derive(Debug, Default)]
pub struct BackendTlsConfigBuilder {
    mode: BackendTlsMode,
    ca_cert_path: Option<PathBuf>,
    roots: Vec<CertificateDer<'static>>,
}

impl BackendTlsConfigBuilder {
    /// Set the trust policy (default: verify).
    pub fn mode(mut self, mode: BackendTlsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Trust the CA certificates in this PEM file instead of the system roots.
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Trust an additional DER-encoded root certificate.
    ///
    /// When any root is added this way, system roots are not loaded.
    pub fn add_root(mut self, cert: CertificateDer<'static>) -> Self {
        self.roots.push(cert);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The CA file cannot be read or contains no certificates
    /// - No root certificates could be found for verify mode
    pub fn build(self) -> Result<BackendTlsConfig> {
        let builder = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("failed to set TLS protocol versions: {}", e)))?;

        let client_config = match self.mode {
            BackendTlsMode::SkipVerify => {
                if self.ca_cert_path.is_some() {
                    tracing::warn!("CA certificate ignored: backend TLS mode is skip-verify");
                }
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
                    .with_no_client_auth()
            }
            BackendTlsMode::Verify => builder
                .with_root_certificates(self.root_store()?)
                .with_no_client_auth(),
        };

        Ok(BackendTlsConfig {
            mode: self.mode,
            ca_cert_path: self.ca_cert_path,
            client_config: Arc::new(client_config),
        })
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();

        if let Some(ca_path) = &self.ca_cert_path {
            let certs = load_certificates(ca_path)?;
            let (added, _) = store.add_parsable_certificates(certs);
            if added == 0 {
                return Err(Error::Config(format!(
                    "no valid certificates found in '{}'",
                    ca_path.display()
                )));
            }
        }

        if !self.roots.is_empty() {
            let (added, ignored) = store.add_parsable_certificates(self.roots.iter().cloned());
            if ignored > 0 {
                tracing::warn!(added, ignored, "some root certificates could not be parsed");
            }
        }

        if store.is_empty() {
            let result = rustls_native_certs::load_native_certs();
            let _ = store.add_parsable_certificates(result.certs);
            if !result.errors.is_empty() {
                tracing::debug!(errors = result.errors.len(), "errors loading system roots");
            }
        }

        if store.is_empty() {
            tracing::warn!("no system root certificates found, using bundled webpki roots");
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        Ok(store)
    }
}

/// Server-side TLS identity presented to clients.
#[derive(Clone)]
pub struct ServerTlsConfig {
    server_config: Arc<ServerConfig>,
}

impl ServerTlsConfig {
    /// Load a certificate chain and private key from PEM files.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let certs = load_certificates(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;
        Self::from_der(certs, key)
    }

    /// Build from PEM-encoded certificate chain and private key held in memory.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = parse_certificates(cert_pem, "<memory>")?;
        let key = parse_private_key(key_pem, "<memory>")?;
        Self::from_der(certs, key)
    }

    /// Build from DER-encoded certificate chain and private key.
    pub fn from_der(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        if certs.is_empty() {
            return Err(Error::Config("server certificate chain is empty".into()));
        }

        let server_config = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("failed to set TLS protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Config(format!("invalid server certificate or key: {}", e)))?;

        Ok(Self {
            server_config: Arc::new(server_config),
        })
    }

    /// Shared rustls ServerConfig; never mutated after construction.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }
}

impl std::fmt::Debug for ServerTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTlsConfig")
            .field("server_config", &"<ServerConfig>")
            .finish()
    }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path).map_err(|e| {
        Error::Config(format!(
            "failed to read certificate file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_certificates(&data, &path.display().to_string())
}

fn parse_certificates(pem: &[u8], source: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::Cursor::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::Config(format!("failed to parse certificates from '{}': {}", source, e))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in '{}'",
            source
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path).map_err(|e| {
        Error::Config(format!(
            "failed to read private key file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_private_key(&data, &path.display().to_string())
}

fn parse_private_key(pem: &[u8], source: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::Cursor::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            Error::Config(format!("failed to parse private key from '{}': {}", source, e))
        })?
        .ok_or_else(|| Error::Config(format!("no private key found in '{}'", source)))
}

/// TLS server name for a backend address of the form `host:port`.
///
/// IP literals (including bracketed IPv6) become IP server names; anything else must be
/// a valid DNS name.
pub fn server_name_for_addr(addr: &str) -> Result<ServerName<'static>> {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => addr,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = host.trim_end_matches('.');

    if host.is_empty() {
        return Err(Error::Config(format!(
            "no host in backend address '{}'",
            addr
        )));
    }

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }

    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Config(format!("invalid hostname for TLS: '{}'", host)))
}

/// Certificate verifier that accepts any certificate.
///
/// Only used for [`BackendTlsMode::SkipVerify`].
#[derive(Debug)]
struct NoCertificateVerification {
    schemes: Vec<SignatureScheme>,
}

impl NoCertificateVerification {
    fn new() -> Self {
        Self {
            schemes: crypto_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> rcgen::CertifiedKey {
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate certificate")
    }

    #[test]
    fn test_backend_tls_mode_from_str() {
        assert_eq!("verify".parse::<BackendTlsMode>().unwrap(), BackendTlsMode::Verify);
        assert_eq!(
            "skip-verify".parse::<BackendTlsMode>().unwrap(),
            BackendTlsMode::SkipVerify
        );
        assert!("insecure".parse::<BackendTlsMode>().is_err());
    }

    #[test]
    fn test_backend_tls_mode_display() {
        assert_eq!(BackendTlsMode::Verify.to_string(), "verify");
        assert_eq!(BackendTlsMode::SkipVerify.to_string(), "skip-verify");
        assert_eq!(BackendTlsMode::default(), BackendTlsMode::Verify);
        assert!(!BackendTlsMode::SkipVerify.verifies());
    }

    #[test]
    fn test_backend_tls_skip_verify_builds() {
        let tls = BackendTlsConfig::builder()
            .mode(BackendTlsMode::SkipVerify)
            .build()
            .expect("skip-verify config");
        assert_eq!(tls.mode(), BackendTlsMode::SkipVerify);

        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("BackendTlsConfig"));
        assert!(debug_str.contains("SkipVerify"));
    }

    #[test]
    fn test_backend_tls_with_explicit_root() {
        let ca = self_signed();
        let tls = BackendTlsConfig::builder()
            .add_root(ca.cert.der().clone())
            .build()
            .expect("verify config");
        assert!(tls.mode().verifies());
    }

    #[test]
    fn test_backend_tls_missing_ca_file() {
        let result = BackendTlsConfig::builder()
            .ca_cert_path("/nonexistent/ca.pem")
            .build();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn test_server_tls_from_pem() {
        let cert = self_signed();
        let tls = ServerTlsConfig::from_pem(
            cert.cert.pem().as_bytes(),
            cert.key_pair.serialize_pem().as_bytes(),
        );
        assert!(tls.is_ok());
    }

    #[test]
    fn test_server_tls_from_pem_without_key() {
        let cert = self_signed();
        let err = ServerTlsConfig::from_pem(cert.cert.pem().as_bytes(), b"")
            .unwrap_err()
            .to_string();
        assert!(err.contains("no private key"));
    }

    #[test]
    fn test_server_tls_missing_files() {
        let err = ServerTlsConfig::from_pem_files("/nonexistent/server.crt", "/nonexistent/server.key")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_server_name_for_addr() {
        assert_eq!(
            server_name_for_addr("db.internal:26257").unwrap(),
            ServerName::try_from("db.internal").unwrap()
        );
        assert!(matches!(
            server_name_for_addr("127.0.0.1:26257").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(matches!(
            server_name_for_addr("[::1]:5432").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(server_name_for_addr("localhost").is_ok());
        assert!(server_name_for_addr(":5432").is_err());
        assert!(server_name_for_addr("bad host:5432").is_err());
    }
}
