use markitdown_service::config::ServiceConfig;
use markitdown_service::services::init_metrics;
use markitdown_service::startup::Application;
use service_core::error::AppError;
use service_core::observability::init_tracing;

fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = ServiceConfig::load()?;

    // One runtime worker thread per configured worker
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.common.workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: ServiceConfig) -> Result<(), AppError> {
    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        converter = %config.converter.program,
        "Starting conversion service"
    );

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
