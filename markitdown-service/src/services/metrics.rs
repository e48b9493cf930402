//! Metrics collection and Prometheus export.
//!
//! Initializes the metrics exporter and provides the /metrics endpoint handler.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Call once at startup before any metrics are recorded.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE.set(handle).map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!("Metrics handle already initialized"))
    })
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

#[derive(Debug, Clone, Copy)]
pub enum ConversionOutcome {
    Success,
    Failure,
}

impl ConversionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ConversionOutcome::Success => "success",
            ConversionOutcome::Failure => "failure",
        }
    }
}

pub fn record_conversion(outcome: ConversionOutcome, elapsed: Duration) {
    let outcome = outcome.as_str();
    counter!("conversions_total", "outcome" => outcome).increment(1);
    histogram!("conversion_duration_seconds", "outcome" => outcome).record(elapsed.as_secs_f64());
}

pub fn record_rejected_upload(reason: &'static str) {
    counter!("uploads_rejected_total", "reason" => reason).increment(1);
}
