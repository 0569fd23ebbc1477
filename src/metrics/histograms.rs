//! Histogram metrics

use super::labels;

/// Record time spent in the startup interceptor and backend dial
pub fn handshake_duration(duration_ms: u64) {
    metrics::histogram!(labels::HANDSHAKE_DURATION).record(duration_ms as f64);
}

/// Record total session lifetime
pub fn session_duration(duration_ms: u64) {
    metrics::histogram!(labels::SESSION_DURATION).record(duration_ms as f64);
}
