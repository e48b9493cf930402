use crate::dtos::MarkdownResponse;
use crate::services::metrics::{record_conversion, record_rejected_upload, ConversionOutcome};
use crate::services::{AcceptedUpload, ScopedTempFile, UploadError, UploadPolicy};
use crate::startup::AppState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use axum::body::Bytes;
use service_core::error::AppError;
use std::time::Instant;

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Convert an uploaded document to Markdown.
///
/// POST /process_file
///
/// Validation failures short-circuit before any filesystem work. Accepted
/// uploads are written to a scoped temp file, handed to the converter, and
/// the temp file is removed before the response leaves this function.
#[utoipa::path(
    post,
    path = "/process_file",
    request_body(content = crate::dtos::ProcessFileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted Markdown", body = MarkdownResponse),
        (status = 400, description = "Missing filename, disallowed type or empty file", body = crate::dtos::ErrorResponse),
        (status = 413, description = "File too large", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::dtos::ErrorResponse),
        (status = 500, description = "Conversion or I/O failure", body = crate::dtos::ErrorResponse)
    ),
    tag = "Conversion"
)]
pub async fn process_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MarkdownResponse>, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        record_rejected_upload("malformed");
        AppError::BadRequest(rejection.body_text())
    })?;

    let (filename, content) = read_upload(&mut multipart, &state.policy).await?;

    let upload = state
        .policy
        .validate(Some(filename.as_str()), content.len())
        .map_err(reject)?;

    tracing::info!(
        filename = %upload.filename,
        size = content.len(),
        "Upload accepted"
    );

    let markdown = convert_upload(&state, &upload, content).await?;

    Ok(Json(MarkdownResponse { markdown }))
}

/// Persists the upload, runs the converter and always removes the temp file.
async fn convert_upload(
    state: &AppState,
    upload: &AcceptedUpload<'_>,
    content: Bytes,
) -> Result<String, AppError> {
    let temp_file = ScopedTempFile::create(
        state.config.upload.temp_dir.clone(),
        upload.extension,
        content,
    )
    .await
    .map_err(|e| {
        tracing::error!(filename = %upload.filename, error = %e, "Failed to write temporary file");
        AppError::InternalError(anyhow::Error::new(e))
    })?;

    let started = Instant::now();
    let result = state.converter.convert(temp_file.path()).await;
    let elapsed = started.elapsed();

    temp_file.release();

    match result {
        Ok(markdown) => {
            record_conversion(ConversionOutcome::Success, elapsed);
            tracing::info!(
                filename = %upload.filename,
                markdown_len = markdown.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "File converted to markdown successfully"
            );
            Ok(markdown)
        }
        Err(e) => {
            record_conversion(ConversionOutcome::Failure, elapsed);
            tracing::error!(
                filename = %upload.filename,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Conversion failed"
            );
            Err(AppError::InternalError(anyhow::Error::new(e)))
        }
    }
}

/// Reads the `file` field into memory. The filename rules run before any of
/// the body is buffered, and the size ceiling is checked as chunks arrive, so
/// a disallowed type is a 400 however large it is.
async fn read_upload(
    multipart: &mut Multipart,
    policy: &UploadPolicy,
) -> Result<(String, Bytes), AppError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| read_error(e, policy))?;

        let Some(mut field) = field else {
            record_rejected_upload("missing_file");
            return Err(AppError::BadRequest("No file provided".to_string()));
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        policy.check_filename(Some(filename.as_str())).map_err(reject)?;

        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| read_error(e, policy))? {
            if content.len() + chunk.len() > policy.max_file_size() {
                return Err(reject(policy.too_large()));
            }
            content.extend_from_slice(&chunk);
        }

        return Ok((filename, Bytes::from(content)));
    }
}

fn reject(err: UploadError) -> AppError {
    let reason = match err {
        UploadError::MissingFilename => "missing_filename",
        UploadError::DisallowedExtension { .. } => "disallowed_extension",
        UploadError::TooLarge { .. } => "too_large",
        UploadError::Empty => "empty",
    };
    tracing::info!(reason, "Upload rejected");
    record_rejected_upload(reason);
    err.into()
}

/// A body that trips the router's outer byte limit is the same "too large"
/// case as the per-file ceiling.
fn read_error(err: MultipartError, policy: &UploadPolicy) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return reject(policy.too_large());
    }
    record_rejected_upload("malformed");
    AppError::BadRequest(format!("Failed to read upload: {}", err.body_text()))
}
