//! Named counters/gauges/histograms over the `metrics` facade, registered
//! once at startup against a Prometheus recorder (spec §3.1). All names use
//! the `marketloom_` prefix.

use metrics::{counter, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Installs the process-wide Prometheus recorder and starts its HTTP
/// listener. Call once at bootstrap, before any metric macro fires.
pub fn install_recorder(port: u16) -> anyhow::Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let handle = PrometheusBuilder::new().with_http_listener(addr).install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("marketloom_token_refresh_attempts_total", "C2 token refresh attempts");
    metrics::describe_counter!("marketloom_token_refresh_failures_total", "C2 token refresh failures");
    metrics::describe_histogram!(
        "marketloom_broker_http_latency_seconds",
        Unit::Seconds,
        "C3 broker HTTP call latency"
    );
    metrics::describe_counter!("marketloom_broker_http_status_total", "C3 broker HTTP responses by status class");
    metrics::describe_gauge!("marketloom_streamer_active_subscriptions", "C6 distinct subscribed tickers");
    metrics::describe_histogram!(
        "marketloom_streamer_broadcast_latency_seconds",
        Unit::Seconds,
        "C6 time from poll to broadcast"
    );
    metrics::describe_histogram!(
        "marketloom_enrichment_position_duration_seconds",
        Unit::Seconds,
        "C7 per-position enrichment duration"
    );
    metrics::describe_counter!("marketloom_enrichment_subanalysis_failures_total", "C7 degraded sub-analyses by kind");
    metrics::describe_histogram!(
        "marketloom_monte_carlo_run_duration_seconds",
        Unit::Seconds,
        "C9 simulation wall-clock duration"
    );
    metrics::describe_histogram!(
        "marketloom_backtest_run_duration_seconds",
        Unit::Seconds,
        "C10 backtest wall-clock duration"
    );
    metrics::describe_counter!("marketloom_alerts_emitted_total", "C12 emitted alerts by signal type");
    metrics::describe_gauge!("marketloom_journal_trades", "C11 trade count by status");
}

pub fn record_token_refresh_attempt(broker: &str) {
    counter!("marketloom_token_refresh_attempts_total", "broker" => broker.to_string()).increment(1);
}

pub fn record_token_refresh_failure(broker: &str) {
    counter!("marketloom_token_refresh_failures_total", "broker" => broker.to_string()).increment(1);
}

pub fn record_broker_http_call(endpoint: &str, status_class: &str, latency_secs: f64) {
    histogram!("marketloom_broker_http_latency_seconds", "endpoint" => endpoint.to_string()).record(latency_secs);
    counter!(
        "marketloom_broker_http_status_total",
        "endpoint" => endpoint.to_string(),
        "status_class" => status_class.to_string()
    )
    .increment(1);
}

pub fn set_streamer_active_subscriptions(count: f64) {
    gauge!("marketloom_streamer_active_subscriptions").set(count);
}

pub fn record_streamer_broadcast_latency(ticker: &str, latency_secs: f64) {
    histogram!("marketloom_streamer_broadcast_latency_seconds", "ticker" => ticker.to_string()).record(latency_secs);
}

pub fn record_enrichment_position_duration(duration_secs: f64) {
    histogram!("marketloom_enrichment_position_duration_seconds").record(duration_secs);
}

pub fn record_enrichment_subanalysis_failure(kind: &str) {
    counter!("marketloom_enrichment_subanalysis_failures_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_monte_carlo_run(duration_secs: f64) {
    histogram!("marketloom_monte_carlo_run_duration_seconds").record(duration_secs);
}

pub fn record_backtest_run(duration_secs: f64) {
    histogram!("marketloom_backtest_run_duration_seconds").record(duration_secs);
}

pub fn record_alert_emitted(signal_type: &str) {
    counter!("marketloom_alerts_emitted_total", "signal_type" => signal_type.to_string()).increment(1);
}

pub fn set_journal_trade_count(status: &str, count: f64) {
    gauge!("marketloom_journal_trades", "status" => status.to_string()).set(count);
}
