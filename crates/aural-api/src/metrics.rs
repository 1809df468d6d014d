//! Prometheus metrics for the signaling server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "aural_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "aural_http_request_duration_seconds";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "aural_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "aural_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "aural_ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED: &str = "aural_ws_messages_received_total";

    // Session metrics
    pub const SESSIONS_ACTIVE: &str = "aural_sessions_active";
    pub const OFFERS_TOTAL: &str = "aural_offers_total";
    pub const SESSIONS_REMOVED_TOTAL: &str = "aural_sessions_removed_total";
    pub const STALE_MESSAGES_TOTAL: &str = "aural_stale_messages_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_sent(event: &'static str) {
    counter!(names::WS_MESSAGES_SENT, "event" => event).increment(1);
}

/// `event` is the client event name, or `invalid` for unparseable frames.
pub fn record_ws_message_received(event: &'static str) {
    counter!(names::WS_MESSAGES_RECEIVED, "event" => event).increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!(names::SESSIONS_ACTIVE).set(count as f64);
}

/// `outcome` is `answered` or `failed`.
pub fn record_offer(outcome: &'static str) {
    counter!(names::OFFERS_TOTAL, "outcome" => outcome).increment(1);
}

/// `reason` is `disconnect`, `peer_state` or `cleanup`.
pub fn record_session_removed(reason: &'static str) {
    counter!(names::SESSIONS_REMOVED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_stale_message(event: &'static str) {
    counter!(names::STALE_MESSAGES_TOTAL, "event" => event).increment(1);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    // Route templates only, to keep label cardinality bounded
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
