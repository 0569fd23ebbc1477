//! Counter metrics

use super::labels;

/// Record an accepted client connection
pub fn connection_accepted() {
    metrics::counter!(labels::CONNECTIONS_ACCEPTED).increment(1);
}

/// Record a session entering the relay phase
pub fn session_established() {
    metrics::counter!(labels::SESSIONS_ESTABLISHED).increment(1);
}

/// Record a connection attempt that failed before the relay phase
pub fn session_error(kind: &'static str) {
    metrics::counter!(labels::SESSION_ERRORS, labels::KIND => kind).increment(1);
}

/// Record the end of a relay
pub fn relay_closed(direction: &'static str, clean: bool) {
    metrics::counter!(
        labels::RELAY_CLOSED,
        labels::DIRECTION => direction,
        labels::CLEAN => if clean { "true" } else { "false" }
    )
    .increment(1);
}

/// Record bytes copied in one direction
pub fn bytes_relayed(direction: &'static str, bytes: u64) {
    metrics::counter!(labels::BYTES_RELAYED, labels::DIRECTION => direction).increment(bytes);
}
