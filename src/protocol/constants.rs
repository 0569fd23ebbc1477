//! Postgres protocol constants used during connection startup

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: i32 = 0x04D2_162F;

/// GSSENCRequest code (80877104 = 1234 << 16 | 5680)
pub const GSSENC_REQUEST_CODE: i32 = 0x04D2_1630;

/// CancelRequest code (80877102 = 1234 << 16 | 5678)
pub const CANCEL_REQUEST_CODE: i32 = 0x04D2_162E;

/// Smallest valid startup frame: length + code
pub const MIN_STARTUP_LENGTH: usize = 8;

/// Largest startup frame accepted, matching Postgres' `MAX_STARTUP_PACKET_LENGTH`
pub const MAX_STARTUP_LENGTH: usize = 10_000;

/// Encryption negotiation responses
pub mod ssl_response {
    /// Proceed with TLS
    pub const ACCEPT: u8 = b'S';

    /// TLS not available
    pub const DECLINE: u8 = b'N';
}

/// Message type tags
pub mod tags {
    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';
}

/// Error/notice field codes
pub mod fields {
    /// Localized severity
    pub const SEVERITY: u8 = b'S';

    /// Non-localized severity (Postgres 9.6+)
    pub const SEVERITY_NONLOCALIZED: u8 = b'V';

    /// SQLSTATE code
    pub const CODE: u8 = b'C';

    /// Primary message
    pub const MESSAGE: u8 = b'M';

    /// Detail
    pub const DETAIL: u8 = b'D';

    /// Hint
    pub const HINT: u8 = b'H';
}

/// SQLSTATE codes sent by the proxy
pub mod sqlstate {
    /// sqlserver_rejected_establishment_of_sqlconnection
    pub const REJECTED_CONNECTION: &str = "08004";
}
