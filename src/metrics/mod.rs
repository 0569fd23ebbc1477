//! Metrics instrumentation
//!
//! Recorded through the `metrics` facade. The library installs no exporter; the
//! embedding process decides where (and whether) metrics are shipped.

pub mod counters;
pub mod histograms;
pub mod labels;
