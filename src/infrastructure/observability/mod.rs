//! Observability init: structured logging (`tracing-subscriber`) plus a
//! Prometheus recorder exposing the named counters/gauges/histograms in
//! `metrics` over an HTTP scrape endpoint (spec §3.1).

pub mod metrics;

pub use metrics::install_recorder;

use crate::config::LogFormat;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber from `log_level`/`log_format`.
/// Call once at process startup, before any other module logs.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
