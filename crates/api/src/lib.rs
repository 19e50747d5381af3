//! Driver Monitor API Server
//!
//! HTTP control surface for the monitoring session plus a live status
//! feed (Server-Sent Events) and Prometheus metrics.

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use session::{SessionController, SnapshotReader};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod config;
mod error;
mod routes;
pub mod telemetry;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use error::{ApiError, ErrorBody};
pub use routes::health::HealthResponse;
pub use telemetry::{init_logging, install_metrics};

/// Application state shared across handlers
pub struct AppState {
    /// Start/stop are serialized through this lock
    pub controller: Mutex<SessionController>,
    /// Lock-free snapshot access for reads and the event feed
    pub reader: SnapshotReader,
    pub metrics: PrometheusHandle,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(controller: SessionController, metrics: PrometheusHandle) -> Self {
        let reader = controller.reader();
        Self {
            controller: Mutex::new(controller),
            reader,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/session", get(routes::session::get_session))
        .route("/api/v1/session/start", post(routes::session::start_session))
        .route("/api/v1/session/stop", post(routes::session::stop_session))
        .route("/api/v1/session/events", get(routes::session::session_events))
        .route("/metrics", get(routes::health::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the server until ctrl-c, then stop any running session
pub async fn run_server(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(Arc::clone(&state));

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = state.controller.lock().await.stop().await;
    if let Some(id) = report.session_id {
        info!("Stopped session {} on shutdown", id);
    }
    for error in &report.errors {
        warn!("Shutdown: {}", error);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
