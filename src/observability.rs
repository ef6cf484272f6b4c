use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations booked (self-service and admin).
pub const RESERVATIONS_BOOKED_TOTAL: &str = "deskd_reservations_booked_total";

/// Counter: bookings rejected because the desk or the user was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "deskd_booking_conflicts_total";

/// Counter: successful check-ins.
pub const CHECKINS_TOTAL: &str = "deskd_checkins_total";

/// Counter: reservations auto-released after a missed check-in.
pub const RESERVATIONS_RELEASED_TOTAL: &str = "deskd_reservations_released_total";

/// Counter: reservations cancelled by their owner or an admin.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "deskd_reservations_cancelled_total";

/// Counter: day-availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "deskd_availability_queries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active organizations (loaded engines).
pub const ORGS_ACTIVE: &str = "deskd_orgs_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "deskd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "deskd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
