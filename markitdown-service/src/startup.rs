use crate::config::{RateLimitConfig, ServiceConfig};
use crate::handlers;
use crate::services::{CommandConverter, Converter, UploadPolicy};
use crate::ApiDoc;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{
        create_ip_rate_limiter, ip_rate_limit_middleware, RateLimit, RateLimitState,
        SharedRateLimiter,
    },
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::any::Any;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

/// Headroom of the whole request body above the file ceiling. The ceiling
/// itself is enforced per field while the upload streams in.
pub const BODY_LIMIT_SLACK: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub policy: Arc<UploadPolicy>,
    pub converter: Arc<dyn Converter>,
    /// Present only while limiting is active.
    pub rate_limiter: Option<SharedRateLimiter>,
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    /// State with the limiter configured in `config.rate_limit`, if any.
    pub fn new(config: ServiceConfig, converter: Arc<dyn Converter>) -> Self {
        let limiter = build_rate_limiter(&config.rate_limit);
        Self::with_rate_limiter(config, converter, limiter)
    }

    /// State with an explicitly supplied limiter (or none).
    pub fn with_rate_limiter(
        config: ServiceConfig,
        converter: Arc<dyn Converter>,
        limiter: Option<(RateLimit, SharedRateLimiter)>,
    ) -> Self {
        let (rate_limit, rate_limiter) = match limiter {
            Some((limit, limiter)) => (Some(limit), Some(limiter)),
            None => (None, None),
        };

        Self {
            policy: Arc::new(UploadPolicy::from_config(&config.upload)),
            config: Arc::new(config),
            converter,
            rate_limiter,
            rate_limit,
        }
    }
}

/// Builds the limiter when enabled. An unusable limit string leaves the
/// service running without limiting.
pub fn build_rate_limiter(config: &RateLimitConfig) -> Option<(RateLimit, SharedRateLimiter)> {
    if !config.enabled {
        return None;
    }

    let built = config
        .limit
        .parse::<RateLimit>()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))
        .and_then(|limit| Ok((limit, create_ip_rate_limiter(&limit)?)));

    match built {
        Ok((limit, limiter)) => {
            tracing::info!(limit = %limit, "Rate limiting enabled");
            Some((limit, limiter))
        }
        Err(e) => {
            tracing::warn!(
                limit = %config.limit,
                error = %e,
                "Rate limiting requested but unavailable; continuing without it"
            );
            None
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut convert_route = Router::new().route("/process_file", post(handlers::process_file));
    if let Some(limiter) = state.rate_limiter.clone() {
        let limit_state = RateLimitState {
            limiter,
            trust_forwarded_for: state.config.rate_limit.trust_forwarded_for,
        };
        convert_route =
            convert_route.route_layer(from_fn_with_state(limit_state, ip_rate_limit_middleware));
    }

    let body_limit = state.policy.max_file_size().saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route("/", get(handlers::read_root))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(convert_route)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CorsLayer::permissive())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown panic".to_string());

    tracing::error!(panic = %detail, "Request handler panicked");
    AppError::InternalError(anyhow::anyhow!(detail)).into_response()
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: ServiceConfig) -> Result<Self, AppError> {
        let converter: Arc<dyn Converter> =
            Arc::new(CommandConverter::from_config(&config.converter));
        Self::build_with_converter(config, converter).await
    }

    pub async fn build_with_converter(
        config: ServiceConfig,
        converter: Arc<dyn Converter>,
    ) -> Result<Self, AppError> {
        if let Some(dir) = &config.upload.temp_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                tracing::error!("Failed to create temp directory {}: {}", dir.display(), e);
                AppError::from(e)
            })?;
        }

        let state = AppState::new(config, converter);

        if let (Some(limiter), Some(limit)) = (state.rate_limiter.clone(), state.rate_limit) {
            spawn_limiter_housekeeping(limiter, limit.window());
        }

        let app = build_router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            workers = state.config.common.workers,
            max_file_size = state.policy.max_file_size(),
            rate_limit = ?state.rate_limit.map(|l| l.to_string()),
            "Listening"
        );

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

fn spawn_limiter_housekeeping(limiter: SharedRateLimiter, window: Duration) {
    let every = window.max(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // first tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.housekeeping();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
