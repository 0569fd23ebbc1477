//! Metric names and label values

/// Connections accepted by the listener
pub const CONNECTIONS_ACCEPTED: &str = "pg_tls_proxy_connections_accepted_total";

/// Sessions that reached the relay phase
pub const SESSIONS_ESTABLISHED: &str = "pg_tls_proxy_sessions_established_total";

/// Connection attempts that failed before the relay phase
pub const SESSION_ERRORS: &str = "pg_tls_proxy_session_errors_total";

/// Relay terminations
pub const RELAY_CLOSED: &str = "pg_tls_proxy_relay_closed_total";

/// Bytes copied by the relay
pub const BYTES_RELAYED: &str = "pg_tls_proxy_bytes_relayed_total";

/// Time from accept to the start of the relay phase
pub const HANDSHAKE_DURATION: &str = "pg_tls_proxy_handshake_duration_ms";

/// Time from accept to session teardown
pub const SESSION_DURATION: &str = "pg_tls_proxy_session_duration_ms";

/// Label: error kind
pub const KIND: &str = "kind";

/// Label: relay direction
pub const DIRECTION: &str = "direction";

/// Label: whether the relay closed cleanly
pub const CLEAN: &str = "clean";

/// Direction value: client to backend
pub const CLIENT_TO_BACKEND: &str = "client_to_backend";

/// Direction value: backend to client
pub const BACKEND_TO_CLIENT: &str = "backend_to_client";
