//! Analyzer Link
//!
//! Owns the single persistent WebSocket connection between a monitoring
//! session and the remote eye-state analyzer:
//! - connect / disconnect with observable `ConnectionState`
//! - fire-and-forget frame sends with a bounded queueing budget
//! - inbound stream of `AlertSignal`s, uncorrelated with sent frames
//! - `ConnectionLost` notifications (no automatic reconnect at this layer)

mod error;
mod link;
mod message;
mod state;

pub use error::LinkError;
pub use link::{AnalyzerLink, LinkConfig};
pub use message::{to_data_url, AlertSignal, Frame, FrameFormat, SignalKind};
pub use state::{ConnectionState, LinkEvent};

use async_trait::async_trait;

/// Destination for sampled frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Hand a frame over for transmission. The frame is consumed whether or
    /// not the send succeeds.
    async fn send(&self, frame: Frame) -> Result<(), LinkError>;
}
