//! Admission rules for uploaded files.
//!
//! Validation is a pure decision over the filename and payload length; it
//! runs before any temp file exists or the converter is invoked.

use crate::config::UploadConfig;
use service_core::error::AppError;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Filename is required")]
    MissingFilename,

    #[error("File type not allowed. Allowed types: {allowed}")]
    DisallowedExtension { allowed: String },

    #[error("File too large. Maximum size: {max_mb}MB")]
    TooLarge { max_mb: usize },

    #[error("File is empty")]
    Empty,
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}

/// An upload that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload<'a> {
    pub filename: &'a str,
    /// Suffix after the last `.`, with its original casing.
    pub extension: &'a str,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: usize,
    allowed_extensions: BTreeSet<String>,
}

impl UploadPolicy {
    pub fn new(max_file_size: usize, allowed_extensions: BTreeSet<String>) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_file_size, config.allowed_extensions.clone())
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Checks, in order: filename present, extension allowed, size within
    /// the ceiling, payload non-empty.
    pub fn validate<'a>(
        &self,
        filename: Option<&'a str>,
        content_len: usize,
    ) -> Result<AcceptedUpload<'a>, UploadError> {
        let accepted = self.check_filename(filename)?;
        self.check_content(content_len)?;
        Ok(accepted)
    }

    /// The filename rules alone; these can be decided before the body is read.
    pub fn check_filename<'a>(
        &self,
        filename: Option<&'a str>,
    ) -> Result<AcceptedUpload<'a>, UploadError> {
        let filename = filename
            .filter(|name| !name.is_empty())
            .ok_or(UploadError::MissingFilename)?;

        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| self.allowed_extensions.contains(&ext.to_lowercase()))
            .ok_or_else(|| UploadError::DisallowedExtension {
                allowed: self.allowed_list(),
            })?;

        Ok(AcceptedUpload {
            filename,
            extension,
        })
    }

    pub fn check_content(&self, content_len: usize) -> Result<(), UploadError> {
        if content_len > self.max_file_size {
            return Err(self.too_large());
        }

        if content_len == 0 {
            return Err(UploadError::Empty);
        }

        Ok(())
    }

    pub fn too_large(&self) -> UploadError {
        UploadError::TooLarge {
            max_mb: self.max_file_size.div_ceil(1024 * 1024),
        }
    }

    fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
