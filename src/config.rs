//! Process-level configuration
//!
//! [`ProxyConfig`] holds paths and addresses as given by the operator;
//! [`ProxyConfig::into_options`] loads the TLS material and produces the immutable
//! [`ProxyOptions`] shared by every connection.

use crate::connection::{BackendTlsConfig, BackendTlsMode, ServerTlsConfig};
use crate::proxy::{DatabaseRoutes, ProxyOptions, StaticBackend};
use crate::Result;
use std::path::PathBuf;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5432";

/// Default backend address
pub const DEFAULT_TARGET_ADDR: &str = "127.0.0.1:26257";

/// Default server certificate path
pub const DEFAULT_CERT_FILE: &str = "server.crt";

/// Default server private key path
pub const DEFAULT_KEY_FILE: &str = "server.key";

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address to accept client connections on
    pub listen_addr: String,
    /// PEM certificate chain presented to clients
    pub cert_file: PathBuf,
    /// PEM private key for `cert_file`
    pub key_file: PathBuf,
    /// Backend for every connection, unless `routes_file` is set
    pub target_addr: String,
    /// JSON route table keyed by database name
    pub routes_file: Option<PathBuf>,
    /// Backend certificate policy
    pub backend_tls_mode: BackendTlsMode,
    /// CA bundle for verifying backends (system roots when unset)
    pub backend_ca_file: Option<PathBuf>,
    /// Name to verify backend certificates against
    pub backend_server_name: Option<String>,
    /// Hint attached to fatal errors sent to clients
    pub error_hint: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            cert_file: PathBuf::from(DEFAULT_CERT_FILE),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            target_addr: DEFAULT_TARGET_ADDR.to_string(),
            routes_file: None,
            backend_tls_mode: BackendTlsMode::Verify,
            backend_ca_file: None,
            backend_server_name: None,
            error_hint: None,
        }
    }
}

impl ProxyConfig {
    /// Create a builder starting from the defaults
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load TLS material and route table, and build the proxy options
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a certificate, key, CA bundle or route table cannot be
    /// loaded, or the backend server name is invalid.
    pub fn into_options(self) -> Result<ProxyOptions> {
        let server_tls = ServerTlsConfig::from_pem_files(&self.cert_file, &self.key_file)?;

        let mut backend_tls = BackendTlsConfig::builder().mode(self.backend_tls_mode);
        if let Some(ca) = self.backend_ca_file {
            backend_tls = backend_tls.ca_cert_path(ca);
        }
        let backend_tls = backend_tls.build()?;

        let builder = match self.routes_file {
            Some(path) => {
                let routes = DatabaseRoutes::from_json_file(&path)?;
                tracing::info!(path = %path.display(), routes = routes.len(), "loaded route table");
                ProxyOptions::builder(server_tls, backend_tls, routes)
            }
            None => ProxyOptions::builder(
                server_tls,
                backend_tls,
                StaticBackend::new(self.target_addr),
            ),
        };

        let builder = match self.backend_server_name {
            Some(name) => builder.backend_server_name(name),
            None => builder,
        };
        let builder = match self.error_hint {
            Some(hint) => builder.error_hint(hint),
            None => builder,
        };

        builder.build()
    }
}

/// Builder for [`ProxyConfig`]
#[derive(Debug, Clone)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the server certificate and key files
    pub fn identity(mut self, cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        self.config.cert_file = cert_file.into();
        self.config.key_file = key_file.into();
        self
    }

    /// Route every connection to `addr`
    pub fn target_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.target_addr = addr.into();
        self
    }

    /// Route by database name using a JSON route table
    pub fn routes_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.routes_file = Some(path.into());
        self
    }

    /// Set the backend certificate policy
    pub fn backend_tls_mode(mut self, mode: BackendTlsMode) -> Self {
        self.config.backend_tls_mode = mode;
        self
    }

    /// Verify backends against this CA bundle
    pub fn backend_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend_ca_file = Some(path.into());
        self
    }

    /// Verify backend certificates against this name
    pub fn backend_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.backend_server_name = Some(name.into());
        self
    }

    /// Attach a hint to fatal errors sent to clients
    pub fn error_hint(mut self, hint: impl Into<String>) -> Self {
        self.config.error_hint = Some(hint.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StartupParams;
    use crate::Error;
    use std::fs;

    fn write_identity(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_file = dir.join("server.crt");
        let key_file = dir.join("server.key");
        fs::write(&cert_file, cert.cert.pem()).unwrap();
        fs::write(&key_file, cert.key_pair.serialize_pem()).unwrap();
        (cert_file, key_file)
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pg-tls-proxy-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:5432");
        assert_eq!(config.target_addr, "127.0.0.1:26257");
        assert_eq!(config.cert_file, PathBuf::from("server.crt"));
        assert_eq!(config.key_file, PathBuf::from("server.key"));
        assert_eq!(config.backend_tls_mode, BackendTlsMode::Verify);
    }

    #[test]
    fn test_builder() {
        let config = ProxyConfig::builder()
            .listen_addr("0.0.0.0:6432")
            .target_addr("db:26257")
            .backend_tls_mode(BackendTlsMode::SkipVerify)
            .error_hint("see the docs")
            .build();

        assert_eq!(config.listen_addr, "0.0.0.0:6432");
        assert_eq!(config.target_addr, "db:26257");
        assert_eq!(config.backend_tls_mode, BackendTlsMode::SkipVerify);
        assert_eq!(config.error_hint.as_deref(), Some("see the docs"));
    }

    #[test]
    fn test_into_options_missing_certificate() {
        let config = ProxyConfig::builder()
            .identity("/nonexistent/server.crt", "/nonexistent/server.key")
            .build();
        let err = config.into_options().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_into_options_with_routes() {
        let dir = scratch_dir("routes");
        let (cert_file, key_file) = write_identity(&dir);
        let routes_file = dir.join("routes.json");
        fs::write(&routes_file, r#"{"routes": {"orders": "10.0.0.5:26257"}}"#).unwrap();

        let options = ProxyConfig::builder()
            .identity(cert_file, key_file)
            .routes_file(&routes_file)
            .backend_tls_mode(BackendTlsMode::SkipVerify)
            .error_hint("check the database name")
            .build()
            .into_options()
            .unwrap();

        let params: StartupParams = [("database", "orders")].into_iter().collect();
        assert_eq!(
            options.backend_resolver().resolve(&params).unwrap(),
            "10.0.0.5:26257"
        );
        let params: StartupParams = [("database", "other")].into_iter().collect();
        assert!(options.backend_resolver().resolve(&params).is_err());
        assert_eq!(options.error_hint(), Some("check the database name"));

        fs::remove_dir_all(&dir).ok();
    }
}
