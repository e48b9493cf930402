//! The document-to-Markdown capability and its command-line implementation.

use crate::config::ConverterConfig;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Any failure raised while extracting text. Callers treat every variant the
/// same way; the distinction only feeds logs.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Turns the file at `path` into Markdown text.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<String, ConversionError>;
}

/// Runs an external converter (`markitdown <file>` by default) and takes its
/// stdout as the Markdown.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout)
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a timed-out child must not outlive its request
            .kill_on_drop(true);

        tracing::debug!(
            program = %self.program,
            args = ?self.args,
            path = %path.display(),
            timeout_secs = ?self.timeout.map(|t| t.as_secs()),
            "Executing converter"
        );

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ConversionError::TimedOut(limit))?,
            None => cmd.output().await,
        }
        .map_err(|source| ConversionError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(
                program = %self.program,
                status = %output.status,
                stderr = %stderr,
                "Converter failed"
            );
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(ConversionError::Failed(message));
        }

        let markdown = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(
            program = %self.program,
            output_size = markdown.len(),
            "Converter succeeded"
        );

        Ok(markdown)
    }
}
