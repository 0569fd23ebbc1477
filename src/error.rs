//! Error types
//!
//! Every failure before the relay phase is terminal for the connection attempt and
//! surfaces as one of these variants. The end of the relay phase is not an error; see
//! [`crate::proxy::RelayClosed`].

use std::io;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unexpected message where only one message type is valid
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A resolver declined the connection (client-attributable)
    #[error("routing rejected: {0}")]
    RoutingRejected(String),

    /// Dialing the backend failed
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        /// Resolved backend address
        addr: String,
        /// Underlying dial error
        #[source]
        source: io::Error,
    },

    /// Backend answered the SSLRequest with something other than `S`
    #[error("backend refused TLS (response byte 0x{0:02X})")]
    BackendRefusedEncryption(u8),

    /// Encryption negotiation, TLS handshake or startup relay with the backend failed
    #[error("backend handshake failed: {0}")]
    BackendHandshakeFailed(String),

    /// TLS setup or handshake with the client failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configuration error
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Session state machine violation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// I/O error on the client connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ProtocolViolation(_) => "protocol_violation",
            Error::RoutingRejected(_) => "routing_rejected",
            Error::BackendUnreachable { .. } => "backend_unreachable",
            Error::BackendRefusedEncryption(_) => "backend_refused_encryption",
            Error::BackendHandshakeFailed(_) => "backend_handshake_failed",
            Error::Tls(_) => "tls",
            Error::Config(_) => "config",
            Error::InvalidState { .. } => "invalid_state",
            Error::Io(_) => "io",
        }
    }

    /// Whether the client caused this failure (as opposed to the backend or the proxy)
    pub fn is_client_attributable(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_) | Error::RoutingRejected(_) | Error::Tls(_)
        )
    }

    /// Whether the failure happened on the backend leg
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::BackendUnreachable { .. }
                | Error::BackendRefusedEncryption(_)
                | Error::BackendHandshakeFailed(_)
        )
    }

    pub(crate) fn backend_handshake(context: &str, err: impl std::fmt::Display) -> Self {
        Error::BackendHandshakeFailed(format!("{}: {}", context, err))
    }
}
