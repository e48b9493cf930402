use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkdownResponse {
    #[schema(example = "# Quarterly report\n\nRevenue grew 12%.")]
    pub markdown: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "File is empty")]
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfoResponse {
    pub service: String,
    pub description: String,
    pub version: String,
    /// Endpoint name to path.
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    /// UTC, ISO-8601.
    pub timestamp: String,
    pub service: String,
    pub version: String,
    pub workers: usize,
    pub rate_limit_enabled: bool,
    /// Active limit such as `60/minute`; absent when limiting is off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<String>,
}

/// Multipart body accepted by `POST /process_file`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ProcessFileForm {
    /// Document, image or audio file; the filename is required.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
