//! Driver Monitoring Session
//!
//! Owns the lifecycle of one monitoring session:
//! - Acquires the cabin camera and opens the analyzer link on start
//! - Runs the frame sampler, the elapsed-time ticker and the reconnect loop
//! - Serializes every state update through a single session worker
//! - Publishes a consistent snapshot for the UI and the HTTP API
//! - Tears everything down on stop, tolerating partial failures

pub mod config;
pub mod controller;
pub mod reconnect;
pub mod snapshot;
mod worker;

pub use config::{ReconnectPolicy, SessionConfig, TimingConfig};
pub use controller::{SessionController, StopReport};
pub use snapshot::{SessionSnapshot, SessionState, SessionStatus, SnapshotReader};

use camera_capture::CameraError;
use thiserror::Error;

/// Errors returned by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A monitoring session is already active")]
    AlreadyActive,

    #[error("Capture source unavailable: {0}")]
    Capture(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures collected while tearing a session down
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShutdownError {
    #[error("{task} task failed: {reason}")]
    Task { task: &'static str, reason: String },

    #[error("{task} task did not stop within {timeout_ms}ms")]
    Timeout { task: &'static str, timeout_ms: u64 },

    #[error("Capture release failed: {0}")]
    CaptureRelease(String),
}
