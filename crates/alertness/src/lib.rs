//! Driver Alertness Aggregation
//!
//! Turns the asynchronous inputs of a monitoring session into a coherent
//! alertness state:
//! - Elapsed-time ticks (driving time)
//! - Eyes-closed / eyes-open signals (from the analyzer or a synthetic source)
//! - Analyzer connectivity (so a blind monitor never reports "Normal")

pub mod aggregator;
pub mod config;
pub mod source;
pub mod state;
pub mod synthetic;

pub use aggregator::AlertnessAggregator;
pub use config::AlertnessConfig;
pub use source::SignalSource;
pub use state::{AlertLevel, AlertnessState};
pub use synthetic::{SyntheticConfig, SyntheticGenerator};

use thiserror::Error;

/// Alertness error types
#[derive(Error, Debug)]
pub enum AlertnessError {
    #[error("Configuration error: {0}")]
    Config(String),
}
