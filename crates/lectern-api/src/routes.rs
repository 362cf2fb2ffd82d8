//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    apply_suggestion, context_summary, get_timeline, get_video_status, health, ready, start_engagement,
    start_processing, start_refinement,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/videos/:video_id/process", post(start_processing))
        .route("/videos/:video_id/status", get(get_video_status))
        .route("/videos/:video_id/timeline", get(get_timeline))
        .route("/videos/:video_id/refinement", post(start_refinement))
        .route("/videos/:video_id/engagement", post(start_engagement))
        .route("/videos/:video_id/suggestions/apply", post(apply_suggestion))
        .route("/videos/:video_id/context-summary", post(context_summary));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(video_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
