//! Connection management
//!
//! This module handles:
//! * Startup-phase framing over either leg of a session
//! * Session state machine enforcement
//! * TLS configuration for the client and backend legs

mod conn;
mod state;
mod tls;

pub use conn::Connection;
pub use state::SessionState;
pub use tls::{
    server_name_for_addr, BackendTlsConfig, BackendTlsConfigBuilder, BackendTlsMode,
    ServerTlsConfig,
};
