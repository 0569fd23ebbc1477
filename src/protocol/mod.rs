//! Postgres wire protocol, restricted to what a startup-phase relay needs
//!
//! This module handles:
//! * Startup frame decoding (SSLRequest, GSSENCRequest, CancelRequest, StartupMessage)
//! * Startup and SSLRequest encoding towards the backend
//! * ErrorResponse encoding for fatal errors sent to clients

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{decode_error_response, decode_startup};
pub use encode::{encode_error_response, encode_ssl_request, encode_startup};
pub use message::{ErrorFields, StartupFrame, StartupMessage, StartupParams};
