use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "hallbook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "hallbook_query_duration_seconds";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: booking requests stored as pending.
pub const BOOKINGS_REQUESTED_TOTAL: &str = "hallbook_bookings_requested_total";

/// Counter: booking requests refused because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "hallbook_booking_conflicts_total";

/// Counter: availability checks. Labels: verdict.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "hallbook_availability_checks_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "hallbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "hallbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "hallbook_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "hallbook_auth_failures_total";

/// Counter: background WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "hallbook_wal_compactions_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hallbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hallbook_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertHall { .. } => "insert_hall",
        Command::DeleteHall { .. } => "delete_hall",
        Command::InsertBooking { .. } => "insert_booking",
        Command::ApproveBooking { .. } => "approve_booking",
        Command::RejectBooking { .. } => "reject_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectHalls => "select_halls",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectDayView { .. } => "select_day_view",
        Command::SelectHallOverview { .. } => "select_hall_overview",
    }
}
