//! Prometheus metrics HTTP server.
//!
//! Exposes relay statistics in Prometheus text format via HTTP endpoint.

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::RelayStats;

/// Start the Prometheus metrics HTTP server.
///
/// Serves metrics at `/metrics` until the task is dropped.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<RelayStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats);

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler(State(stats): State<Arc<RelayStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} counter", name);
    let _ = writeln!(output, "{} {}", name, value);
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &RelayStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(2048);

    output.push_str("# HELP qso_relay_uptime_seconds Time since the relay started\n");
    output.push_str("# TYPE qso_relay_uptime_seconds gauge\n");
    let _ = writeln!(output, "qso_relay_uptime_seconds {:.3}", summary.elapsed_secs);

    counter(
        &mut output,
        "qso_relay_bytes_received_total",
        "Total datagram payload bytes received",
        summary.bytes_received,
    );
    counter(
        &mut output,
        "qso_relay_qsos_parsed_total",
        "Datagrams parsed into a QSO record",
        summary.qsos_parsed,
    );
    counter(
        &mut output,
        "qso_relay_unprocessed_total",
        "Datagrams that did not contain a usable QSO",
        summary.unprocessed,
    );
    counter(
        &mut output,
        "qso_relay_processing_errors_total",
        "Records dropped because the settings could not be read",
        summary.processing_errors,
    );

    output.push_str("# HELP qso_relay_uploads_total LdA upload attempts by outcome\n");
    output.push_str("# TYPE qso_relay_uploads_total counter\n");
    let _ = writeln!(
        output,
        "qso_relay_uploads_total{{outcome=\"success\"}} {}",
        summary.uploads_succeeded
    );
    let _ = writeln!(
        output,
        "qso_relay_uploads_total{{outcome=\"failure\"}} {}",
        summary.uploads_failed
    );

    output.push_str("# HELP qso_relay_datagrams_total Datagrams received by software profile\n");
    output.push_str("# TYPE qso_relay_datagrams_total counter\n");
    let mut software: Vec<_> = summary.by_software.iter().collect();
    software.sort();
    for (name, count) in software {
        let _ = writeln!(
            output,
            "qso_relay_datagrams_total{{software=\"{}\"}} {}",
            name, count
        );
    }
    if summary.by_software.is_empty() {
        let _ = writeln!(output, "qso_relay_datagrams_total {}", summary.datagrams);
    }

    if let Some(ref latency) = summary.latency_ms {
        output.push_str("# HELP qso_relay_upload_latency_ms LdA upload round-trip time\n");
        output.push_str("# TYPE qso_relay_upload_latency_ms summary\n");
        let _ = writeln!(
            output,
            "qso_relay_upload_latency_ms{{quantile=\"0.5\"}} {}",
            latency.p50
        );
        let _ = writeln!(
            output,
            "qso_relay_upload_latency_ms{{quantile=\"0.9\"}} {}",
            latency.p90
        );
        let _ = writeln!(
            output,
            "qso_relay_upload_latency_ms{{quantile=\"0.99\"}} {}",
            latency.p99
        );
        let _ = writeln!(
            output,
            "qso_relay_upload_latency_ms_count {}",
            summary.uploads_succeeded + summary.uploads_failed
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_prometheus_metrics_empty() {
        let stats = RelayStats::new();
        let output = format_prometheus_metrics(&stats);

        assert!(output.contains("qso_relay_uptime_seconds"));
        assert!(output.contains("qso_relay_datagrams_total 0"));
        assert!(output.contains("qso_relay_unprocessed_total 0"));
        assert!(!output.contains("qso_relay_upload_latency_ms"));
    }

    #[test]
    fn test_format_prometheus_metrics_with_data() {
        let stats = RelayStats::new();
        stats.record_datagram("Log4OM", 100);
        stats.record_parsed();
        stats.record_upload(true, Duration::from_millis(250));

        let output = format_prometheus_metrics(&stats);

        assert!(output.contains("qso_relay_datagrams_total{software=\"Log4OM\"} 1"));
        assert!(output.contains("qso_relay_bytes_received_total 100"));
        assert!(output.contains("qso_relay_uploads_total{outcome=\"success\"} 1"));
        assert!(output.contains("qso_relay_upload_latency_ms_count 1"));
    }

    #[test]
    fn test_prometheus_format_validity() {
        let stats = RelayStats::new();
        stats.record_datagram("N1MM+", 10);
        let output = format_prometheus_metrics(&stats);

        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            assert!(parts.len() >= 2, "Invalid metric line: {}", line);
        }
    }
}
