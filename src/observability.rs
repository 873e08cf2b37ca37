use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "reservd_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reservd_http_request_duration_seconds";

/// Counter: reservations accepted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "reservd_reservations_created_total";

/// Counter: reservation creations rejected. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "reservd_reservations_rejected_total";

// ── Live updates ────────────────────────────────────────────────

/// Counter: snapshots published. Labels: topic.
pub const BROADCASTS_TOTAL: &str = "reservd_broadcasts_total";

/// Counter: snapshot frames skipped by slow WebSocket clients.
pub const BROADCAST_LAGGED_TOTAL: &str = "reservd_broadcast_lagged_total";

/// Gauge: open WebSocket connections.
pub const WS_CONNECTIONS_ACTIVE: &str = "reservd_ws_connections_active";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "reservd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "reservd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record RED metrics per matched route, so ids in paths don't explode
/// label cardinality.
pub async fn track_http(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}
