//! Request-scoped temp file holding one upload under its original extension.

use axum::body::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

const TEMP_FILE_PREFIX: &str = "markitdown-";

/// Owns a uniquely named file for the lifetime of one request.
///
/// The file is removed exactly once: by [`ScopedTempFile::release`] on the
/// normal path, or by `Drop` when the request future is cancelled or
/// unwinds. Removal failures are logged and never surfaced to the caller.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: Option<TempPath>,
}

impl ScopedTempFile {
    /// Creates `<dir>/markitdown-XXXXXX.<extension>` and writes `content`.
    /// A partially written file is removed before the error is returned.
    pub async fn create(dir: Option<PathBuf>, extension: &str, content: Bytes) -> io::Result<Self> {
        let suffix = format!(".{}", extension);

        let path = tokio::task::spawn_blocking(move || -> io::Result<TempPath> {
            let mut builder = tempfile::Builder::new();
            builder.prefix(TEMP_FILE_PREFIX).suffix(&suffix);

            let mut file = match dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&content)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| io::Error::other(format!("Temp file writer task failed: {}", e)))??;

        tracing::info!(path = %path.display(), "Temporary file created");

        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        // Only `remove` takes the path, and it consumes or drops `self`.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Deletes the file now.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();

        match path.close() {
            Ok(()) => tracing::info!(path = %shown, "Temporary file deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %shown, "Temporary file already gone")
            }
            Err(e) => {
                tracing::warn!(path = %shown, error = %e, "Failed to delete temporary file")
            }
        }
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        self.remove();
    }
}
