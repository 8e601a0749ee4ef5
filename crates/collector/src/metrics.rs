use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "collector_snapshots_appended_total",
        "Number of new snapshots written to history."
    );
    describe_counter!(
        "collector_sweep_errors_total",
        "Number of signals that failed during a sweep."
    );
    describe_counter!(
        "collector_fetch_errors_total",
        "Number of page fetches rejected with a non-success status."
    );
    describe_counter!(
        "collector_notify_errors_total",
        "Number of failed notification deliveries."
    );
    describe_histogram!(
        "collector_fetch_latency_ms",
        "Page fetch latency in milliseconds."
    );
    describe_histogram!(
        "collector_db_query_latency_ms",
        "Database query latency in milliseconds."
    );
    describe_counter!(
        "collector_db_query_errors_total",
        "Number of failed database queries."
    );
    describe_counter!(
        "tracing_error_events",
        "Number of error-level tracing events."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
