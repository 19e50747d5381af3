//! Session configuration

use alertness::{AlertnessConfig, SignalSource};
use analyzer_link::LinkConfig;
use frame_sampler::SamplerConfig;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Reconnect policy applied while a session is active
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Retry the analyzer connection after failures and losses
    pub enabled: bool,
    /// First retry delay (milliseconds)
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling delay (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Everything a session needs besides the capture source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub link: LinkConfig,
    pub sampler: SamplerConfig,
    pub alertness: AlertnessConfig,
    pub signal_source: SignalSource,
    pub reconnect: ReconnectPolicy,
    pub timing: TimingConfig,
}

/// Session clocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Elapsed-time tick period; each tick counts one elapsed second (milliseconds)
    pub tick_interval_ms: u64,
    /// Budget for each background task to stop during shutdown (milliseconds)
    pub shutdown_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        self.alertness
            .validate()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        if let SignalSource::SyntheticGenerator(synthetic) = &self.signal_source {
            synthetic
                .validate()
                .map_err(|e| SessionError::Config(e.to_string()))?;
        }

        if self.timing.tick_interval_ms == 0 {
            return Err(SessionError::Config("tick_interval_ms must be positive".into()));
        }
        if self.sampler.interval_ms == 0 {
            return Err(SessionError::Config("sampler interval_ms must be positive".into()));
        }
        if self.sampler.output_width == 0 || self.sampler.output_height == 0 {
            return Err(SessionError::Config("sampler output size must be non-zero".into()));
        }
        if self.reconnect.enabled && self.reconnect.initial_backoff_ms == 0 {
            return Err(SessionError::Config(
                "reconnect initial_backoff_ms must be positive".into(),
            ));
        }
        if !self.link.endpoint.starts_with("ws://") && !self.link.endpoint.starts_with("wss://") {
            return Err(SessionError::Config(format!(
                "analyzer endpoint must be a ws:// or wss:// URL, got {}",
                self.link.endpoint
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertness::SyntheticConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_http_endpoint() {
        let mut config = SessionConfig::default();
        config.link.endpoint = "http://localhost:8000/ws".into();
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_rejects_nan_synthetic_probability() {
        let mut config = SessionConfig::default();
        config.signal_source = SignalSource::SyntheticGenerator(SyntheticConfig {
            eyes_closed_probability: f64::NAN,
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));

        config.signal_source = SignalSource::SyntheticGenerator(SyntheticConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_tick() {
        let mut config = SessionConfig::default();
        config.timing.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
