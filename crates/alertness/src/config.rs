//! Alertness policy configuration

use serde::{Deserialize, Serialize};

use crate::AlertnessError;

/// Alert level policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertnessConfig {
    /// How long a single eyes-closed signal keeps the level raised (milliseconds)
    pub hold_period_ms: u64,

    /// Rolling window for escalation to critical (milliseconds)
    pub escalation_window_ms: u64,

    /// Eyes-closed signals within the window that escalate to critical
    pub critical_signal_count: usize,

    /// Tolerated analyzer disconnection before reporting it unavailable (milliseconds)
    pub grace_period_ms: u64,
}

impl Default for AlertnessConfig {
    fn default() -> Self {
        Self {
            hold_period_ms: 3000,
            escalation_window_ms: 10_000,
            critical_signal_count: 3,
            grace_period_ms: 5000,
        }
    }
}

impl AlertnessConfig {
    pub fn validate(&self) -> Result<(), AlertnessError> {
        if self.hold_period_ms == 0 {
            return Err(AlertnessError::Config("hold_period_ms must be positive".into()));
        }
        if self.critical_signal_count < 2 {
            return Err(AlertnessError::Config(
                "critical_signal_count must be at least 2".into(),
            ));
        }
        if self.escalation_window_ms < self.hold_period_ms {
            return Err(AlertnessError::Config(
                "escalation_window_ms must not be shorter than hold_period_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AlertnessConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_single_signal_escalation() {
        let config = AlertnessConfig {
            critical_signal_count: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
