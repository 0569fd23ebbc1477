//! Per-listener proxy options

use super::routing::{BackendResolver, ServerNameResolver};
use crate::connection::{BackendTlsConfig, ServerTlsConfig};
use crate::protocol::ErrorFields;
use crate::{Error, Result};
use rustls_pki_types::ServerName;
use std::sync::Arc;

/// Immutable configuration shared by every connection a listener serves.
///
/// Cloning is cheap; all heavy state sits behind `Arc`.
#[derive(Clone)]
pub struct ProxyOptions {
    server_tls: ServerTlsConfig,
    backend_tls: BackendTlsConfig,
    backend_resolver: Arc<dyn BackendResolver>,
    server_name_resolver: Option<Arc<dyn ServerNameResolver>>,
    backend_server_name: Option<ServerName<'static>>,
    error_hint: Option<String>,
}

impl ProxyOptions {
    /// Start building options from the required parts
    ///
    /// # Arguments
    ///
    /// * `server_tls` - Certificate and key presented to clients
    /// * `backend_tls` - Trust policy for backend connections
    /// * `backend_resolver` - Maps startup parameters to a backend address
    pub fn builder(
        server_tls: ServerTlsConfig,
        backend_tls: BackendTlsConfig,
        backend_resolver: impl BackendResolver + 'static,
    ) -> ProxyOptionsBuilder {
        ProxyOptionsBuilder {
            server_tls,
            backend_tls,
            backend_resolver: Arc::new(backend_resolver),
            server_name_resolver: None,
            backend_server_name: None,
            error_hint: None,
        }
    }

    /// TLS identity presented to clients
    pub fn server_tls(&self) -> &ServerTlsConfig {
        &self.server_tls
    }

    /// Backend trust policy
    pub fn backend_tls(&self) -> &BackendTlsConfig {
        &self.backend_tls
    }

    /// Backend resolver
    pub fn backend_resolver(&self) -> &dyn BackendResolver {
        self.backend_resolver.as_ref()
    }

    /// SNI resolver, if configured
    pub fn server_name_resolver(&self) -> Option<&dyn ServerNameResolver> {
        self.server_name_resolver.as_deref()
    }

    /// TLS server name used for every backend, overriding the resolved host
    pub fn backend_server_name(&self) -> Option<&ServerName<'static>> {
        self.backend_server_name.as_ref()
    }

    /// Hint attached to fatal error responses
    pub fn error_hint(&self) -> Option<&str> {
        self.error_hint.as_deref()
    }
}

impl std::fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("server_tls", &self.server_tls)
            .field("backend_tls", &self.backend_tls)
            .field("server_name_resolver", &self.server_name_resolver.is_some())
            .field("backend_server_name", &self.backend_server_name)
            .field("error_hint", &self.error_hint)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ProxyOptions`]
pub struct ProxyOptionsBuilder {
    server_tls: ServerTlsConfig,
    backend_tls: BackendTlsConfig,
    backend_resolver: Arc<dyn BackendResolver>,
    server_name_resolver: Option<Arc<dyn ServerNameResolver>>,
    backend_server_name: Option<String>,
    error_hint: Option<String>,
}

impl ProxyOptionsBuilder {
    /// Consult `resolver` with the TLS server name of every connection
    ///
    /// Only rejections and "no override" answers are supported; an override address
    /// fails the connection with [`Error::Config`].
    pub fn server_name_resolver(mut self, resolver: impl ServerNameResolver + 'static) -> Self {
        self.server_name_resolver = Some(Arc::new(resolver));
        self
    }

    /// Verify every backend certificate against this name instead of the resolved host
    pub fn backend_server_name(mut self, name: impl Into<String>) -> Self {
        self.backend_server_name = Some(name.into());
        self
    }

    /// Hint attached to every fatal error response sent to clients
    pub fn error_hint(mut self, hint: impl Into<String>) -> Self {
        self.error_hint = Some(hint.into());
        self
    }

    /// Build the options
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the backend server name is not a valid DNS name or
    /// IP address.
    pub fn build(self) -> Result<ProxyOptions> {
        let backend_server_name = self
            .backend_server_name
            .map(|name| {
                ServerName::try_from(name.clone()).map_err(|_| {
                    Error::Config(format!("invalid backend server name '{}'", name))
                })
            })
            .transpose()?;

        Ok(ProxyOptions {
            server_tls: self.server_tls,
            backend_tls: self.backend_tls,
            backend_resolver: self.backend_resolver,
            server_name_resolver: self.server_name_resolver,
            backend_server_name,
            error_hint: self.error_hint.filter(|hint| !hint.is_empty()),
        })
    }
}

/// Fatal error response carrying the configured hint
pub(crate) fn fatal(message: impl Into<String>, hint: Option<&str>) -> ErrorFields {
    ErrorFields::fatal(message).with_hint(hint.map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BackendTlsMode;
    use crate::proxy::routing::{Rejection, StaticBackend};

    fn server_tls() -> ServerTlsConfig {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        ServerTlsConfig::from_pem(
            cert.cert.pem().as_bytes(),
            cert.key_pair.serialize_pem().as_bytes(),
        )
        .unwrap()
    }

    fn backend_tls() -> BackendTlsConfig {
        BackendTlsConfig::builder()
            .mode(BackendTlsMode::SkipVerify)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let options = ProxyOptions::builder(
            server_tls(),
            backend_tls(),
            StaticBackend::new("127.0.0.1:26257"),
        )
        .build()
        .unwrap();

        assert!(options.server_name_resolver().is_none());
        assert!(options.backend_server_name().is_none());
        assert!(options.error_hint().is_none());
        assert_eq!(
            options
                .backend_resolver()
                .resolve(&Default::default())
                .unwrap(),
            "127.0.0.1:26257"
        );
    }

    #[test]
    fn test_builder_optional_parts() {
        let options = ProxyOptions::builder(
            server_tls(),
            backend_tls(),
            StaticBackend::new("127.0.0.1:26257"),
        )
        .server_name_resolver(|_: &str| Ok::<Option<String>, Rejection>(None))
        .backend_server_name("db.internal")
        .error_hint("see the connection guide")
        .build()
        .unwrap();

        assert!(options.server_name_resolver().is_some());
        assert_eq!(
            options.backend_server_name(),
            Some(&ServerName::try_from("db.internal".to_string()).unwrap())
        );
        assert_eq!(options.error_hint(), Some("see the connection guide"));
    }

    #[test]
    fn test_builder_rejects_invalid_server_name() {
        let err = ProxyOptions::builder(
            server_tls(),
            backend_tls(),
            StaticBackend::new("127.0.0.1:26257"),
        )
        .backend_server_name("not a hostname")
        .build()
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_fatal_with_hint() {
        let fields = fatal("unable to reach backend SQL server", Some("check status"));
        assert_eq!(fields.severity.as_deref(), Some("FATAL"));
        assert_eq!(fields.hint.as_deref(), Some("check status"));
    }
}
