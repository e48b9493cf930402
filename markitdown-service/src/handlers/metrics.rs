use crate::services::get_metrics;
use axum::{http::StatusCode, response::IntoResponse};

/// Prometheus scrape endpoint.
///
/// GET /metrics
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
