//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "lectern_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "lectern_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "lectern_http_requests_in_flight";
    pub const RUNS_SUBMITTED_TOTAL: &str = "lectern_runs_submitted_total";
    pub const SUGGESTIONS_APPLIED_TOTAL: &str = "lectern_suggestions_applied_total";
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

/// Record a detached run accepted by the API.
pub fn record_run_submitted(operation: &'static str) {
    counter!(names::RUNS_SUBMITTED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_suggestion_applied(kind: &'static str) {
    counter!(names::SUGGESTIONS_APPLIED_TOTAL, "kind" => kind).increment(1);
}

/// Route template for a request, so ids never become label values.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
