//! Protocol message types

/// First frame a client sends on a connection (no type tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFrame {
    /// SSLRequest message (TLS negotiation)
    SslRequest,

    /// GSSENCRequest message (GSSAPI encryption negotiation)
    GssEncRequest,

    /// CancelRequest message
    CancelRequest {
        /// Process ID of the backend to cancel
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Startup message
    Startup(StartupMessage),
}

impl StartupFrame {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::SslRequest => "SSLRequest",
            Self::GssEncRequest => "GSSENCRequest",
            Self::CancelRequest { .. } => "CancelRequest",
            Self::Startup(_) => "StartupMessage",
        }
    }
}

/// Startup message: protocol version plus connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    /// Protocol version
    pub version: i32,
    /// Connection parameters, in wire order
    pub params: StartupParams,
}

impl StartupMessage {
    /// Create a startup message for protocol 3.0
    pub fn new(params: impl Into<StartupParams>) -> Self {
        Self {
            version: super::constants::PROTOCOL_VERSION,
            params: params.into(),
        }
    }
}

/// Ordered key/value parameters carried by a startup message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupParams(Vec<(String, String)>);

impl StartupParams {
    /// Look up a parameter by name (first occurrence wins)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over parameters in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a parameter
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub(crate) fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

impl From<Vec<(String, String)>> for StartupParams {
    fn from(params: Vec<(String, String)>) -> Self {
        Self(params)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StartupParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Error/notice fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity (FATAL, ERROR, etc.)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl ErrorFields {
    /// FATAL error with the proxy's rejected-connection SQLSTATE
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Some("FATAL".to_string()),
            code: Some(super::constants::sqlstate::REJECTED_CONNECTION.to_string()),
            message: Some(message.into()),
            detail: None,
            hint: None,
        }
    }

    /// Attach a hint
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref msg) = self.message {
            write!(f, "{}", msg)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_lookup_first_wins() {
        let params: StartupParams = vec![("user", "alice"), ("database", "a"), ("database", "b")]
            .into_iter()
            .collect();

        assert_eq!(params.get("database"), Some("a"));
        assert_eq!(params.get("user"), Some("alice"));
        assert_eq!(params.get("options"), None);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_fatal_error_fields() {
        let fields = ErrorFields::fatal("server requires encryption");
        assert_eq!(fields.severity.as_deref(), Some("FATAL"));
        assert_eq!(fields.code.as_deref(), Some("08004"));
        assert_eq!(
            fields.to_string(),
            "server requires encryption (08004)"
        );
    }
}
