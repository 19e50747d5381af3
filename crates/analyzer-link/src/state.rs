//! Connection state and link notifications

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AlertSignal;

/// Lifecycle of the analyzer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Inbound notification from the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Eye-state observation from the analyzer, in arrival order
    Signal(AlertSignal),
    /// The peer went away without a local disconnect
    ConnectionLost { reason: String },
}
