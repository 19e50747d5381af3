//! Session Routes

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use session::{SessionSnapshot, StopReport};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tracing::{info, warn};

use crate::{ApiError, AppState};

/// Start a monitoring session
pub async fn start_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut controller = state.controller.lock().await;
    let snapshot = controller.start().await.map_err(|e| {
        warn!("Session start rejected: {}", e);
        ApiError::from(e)
    })?;
    info!(
        "Session {:?} started via API",
        snapshot.session.session_id
    );
    Ok(Json(snapshot))
}

/// Stop the running session
pub async fn stop_session(State(state): State<Arc<AppState>>) -> Json<StopReport> {
    let mut controller = state.controller.lock().await;
    Json(controller.stop().await)
}

/// Latest snapshot; never waits on a start or stop in progress
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.reader.snapshot())
}

/// Stream of snapshots, newest first on connect
pub async fn session_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.reader.watch()).map(|snapshot| {
        let event = Event::default()
            .event("snapshot")
            .json_data(&snapshot)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
