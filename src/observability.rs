use std::net::SocketAddr;

use crate::wire::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: service requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "covers_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "covers_request_duration_seconds";

/// Counter: validation decisions. Labels: kind, outcome (accepted or rejection kind).
pub const VALIDATIONS_TOTAL: &str = "covers_validations_total";

/// Counter: reservations committed. Labels: kind.
pub const COMMITS_TOTAL: &str = "covers_commits_total";

/// Counter: commits whose capacity re-check failed under the month lock.
pub const COMMIT_RACES_TOTAL: &str = "covers_commit_races_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "covers_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "covers_connections_total";

/// Counter: connections turned away at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "covers_connections_rejected_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "covers_journal_flush_duration_seconds";

/// Histogram: records per journal flush.
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "covers_journal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a service command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Validate { .. } => "validate",
        Command::Book { .. } => "book",
        Command::Get { .. } => "get",
        Command::SetStatus { .. } => "set_status",
        Command::Delete { .. } => "delete",
        Command::Capacity { .. } => "capacity",
    }
}
