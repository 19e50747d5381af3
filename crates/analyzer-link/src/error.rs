//! Analyzer link error types

use thiserror::Error;

/// Errors that can occur on the analyzer link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Endpoint unreachable or handshake failed
    #[error("Connection to analyzer failed: {0}")]
    Connection(String),

    /// Send attempted outside the Connected state
    #[error("Analyzer link is not connected")]
    NotConnected,

    /// Outbound queue stayed full for the whole send budget
    #[error("Frame send timed out after {0}ms")]
    SendTimeout(u64),

    /// Inbound message could not be decoded
    #[error("Invalid analyzer message: {0}")]
    Protocol(String),

    /// Outbound frame could not be serialized
    #[error("Frame serialization failed: {0}")]
    Serialization(String),
}

impl LinkError {
    /// Whether the frame was dropped because the link could not take it.
    /// Callers treat these as silent per-frame drops.
    pub fn is_drop(&self) -> bool {
        matches!(self, LinkError::NotConnected | LinkError::SendTimeout(_))
    }
}
