//! Backend address resolution
//!
//! A [`BackendResolver`] maps the client's startup parameters to a backend address.
//! A [`ServerNameResolver`] is consulted with the TLS server name (SNI); the only
//! supported answer today is "no override".

use crate::protocol::StartupParams;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A client-attributable refusal to route a connection.
///
/// The message is sent to the client verbatim in a fatal ErrorResponse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Rejection {
    message: String,
}

impl Rejection {
    /// Create a rejection with a client-facing message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Client-facing message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Resolves a backend address (`host:port`) from startup parameters.
pub trait BackendResolver: Send + Sync {
    /// Resolve the backend for one connection
    fn resolve(&self, params: &StartupParams) -> std::result::Result<String, Rejection>;
}

impl<F> BackendResolver for F
where
    F: Fn(&StartupParams) -> std::result::Result<String, Rejection> + Send + Sync,
{
    fn resolve(&self, params: &StartupParams) -> std::result::Result<String, Rejection> {
        self(params)
    }
}

/// Resolves a backend override from the TLS server name.
///
/// `Ok(None)` (or an empty address) means "use the parameter-based backend".
pub trait ServerNameResolver: Send + Sync {
    /// Inspect the server name sent by the client (empty if none was sent)
    fn resolve(&self, server_name: &str) -> std::result::Result<Option<String>, Rejection>;
}

impl<F> ServerNameResolver for F
where
    F: Fn(&str) -> std::result::Result<Option<String>, Rejection> + Send + Sync,
{
    fn resolve(&self, server_name: &str) -> std::result::Result<Option<String>, Rejection> {
        self(server_name)
    }
}

/// Routes every connection to one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticBackend {
    addr: String,
}

impl StaticBackend {
    /// Route everything to `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl BackendResolver for StaticBackend {
    fn resolve(&self, _params: &StartupParams) -> std::result::Result<String, Rejection> {
        Ok(self.addr.clone())
    }
}

/// Routes by the `database` startup parameter using a fixed table.
///
/// Without a `database` parameter the `user` parameter is used, matching the
/// Postgres default. Loaded from JSON:
///
/// ```json
/// {
///   "routes": { "orders": "10.0.0.5:26257", "analytics": "10.0.0.6:26257" },
///   "default": "10.0.0.4:26257"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseRoutes {
    #[serde(default)]
    routes: HashMap<String, String>,
    #[serde(default)]
    default: Option<String>,
}

impl DatabaseRoutes {
    /// Empty table with no default (rejects everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route
    pub fn route(mut self, database: impl Into<String>, addr: impl Into<String>) -> Self {
        self.routes.insert(database.into(), addr.into());
        self
    }

    /// Backend for databases without an explicit route
    pub fn default_backend(mut self, addr: impl Into<String>) -> Self {
        self.default = Some(addr.into());
        self
    }

    /// Parse a route table from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid route table: {}", e)))
    }

    /// Load a route table from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read route table '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Number of explicit routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether there are no explicit routes
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl BackendResolver for DatabaseRoutes {
    fn resolve(&self, params: &StartupParams) -> std::result::Result<String, Rejection> {
        let database = params
            .get("database")
            .filter(|db| !db.is_empty())
            .or_else(|| params.get("user"))
            .ok_or_else(|| Rejection::new("no database specified"))?;

        self.routes
            .get(database)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| Rejection::new(format!("unknown database \"{}\"", database)))
    }
}
