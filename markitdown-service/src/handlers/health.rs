use crate::dtos::{HealthResponse, ServiceInfoResponse};
use crate::startup::AppState;
use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;

const SERVICE_DESCRIPTION: &str = "API for converting documents to Markdown";

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfoResponse)
    ),
    tag = "Observability"
)]
pub async fn read_root(State(state): State<AppState>) -> Json<ServiceInfoResponse> {
    let endpoints = BTreeMap::from([
        ("health".to_string(), "/health".to_string()),
        ("docs".to_string(), "/openapi.json".to_string()),
        ("process".to_string(), "/process_file".to_string()),
        ("metrics".to_string(), "/metrics".to_string()),
    ]);

    Json(ServiceInfoResponse {
        service: state.config.service_name.clone(),
        description: SERVICE_DESCRIPTION.to_string(),
        version: state.config.service_version.clone(),
        endpoints,
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        service: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
        workers: state.config.common.workers,
        rate_limit_enabled: state.rate_limit.is_some(),
        rate_limit: state.rate_limit.map(|limit| limit.to_string()),
    })
}
