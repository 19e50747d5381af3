//! Health and metrics routes

use std::sync::Arc;

use alertness::AlertLevel;
use analyzer_link::ConnectionState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use session::SessionStatus;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub session: SessionStatus,
    pub analyzer: ConnectionState,
    pub alert_level: AlertLevel,
    pub capture_degraded: bool,
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.reader.snapshot();
    let degraded = snapshot.session.status == SessionStatus::Active
        && (snapshot.alertness.level == AlertLevel::AnalyzerUnavailable
            || snapshot.session.capture_degraded);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session: snapshot.session.status,
        analyzer: snapshot.connection,
        alert_level: snapshot.alertness.level,
        capture_degraded: snapshot.session.capture_degraded,
    })
}

/// Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
