pub mod config;
pub mod dtos;
pub mod handlers;
pub mod services;
pub mod startup;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MarkItDown Server",
        description = "API for converting various document formats to Markdown"
    ),
    paths(
        handlers::health::read_root,
        handlers::health::health_check,
        handlers::convert::process_file,
    ),
    components(
        schemas(
            dtos::MarkdownResponse,
            dtos::ErrorResponse,
            dtos::HealthResponse,
            dtos::ServiceInfoResponse,
            dtos::ProcessFileForm,
        )
    ),
    tags(
        (name = "Conversion", description = "Document to Markdown conversion"),
        (name = "Observability", description = "Service health and metadata"),
    )
)]
pub struct ApiDoc;
