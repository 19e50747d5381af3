//! Caller-facing session snapshot

use alertness::AlertnessState;
use analyzer_link::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    #[default]
    Idle,
    Active,
    Stopping,
}

/// Session bookkeeping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    /// Active without an analyzer connection since start
    pub offline: bool,
    /// Capture has been failing past the escalation threshold
    pub capture_degraded: bool,
}

/// Consistent view of session, alertness and connection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionState,
    pub alertness: AlertnessState,
    pub connection: ConnectionState,
}

/// Cheap, cloneable read handle on the latest snapshot
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SnapshotReader {
    pub(crate) fn new(rx: watch::Receiver<SessionSnapshot>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    /// Receiver notified on every published update
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.rx.clone()
    }
}
