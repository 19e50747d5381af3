//! Alertness state exposed to callers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    /// The analyzer has been unreachable past the grace period, so the
    /// driver's state cannot be judged
    AnalyzerUnavailable,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Normal => "Normal",
            AlertLevel::Warning => "Warning",
            AlertLevel::Critical => "Critical",
            AlertLevel::AnalyzerUnavailable => "Analyzer unavailable",
        };
        f.write_str(name)
    }
}

/// Rolling alertness snapshot for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertnessState {
    pub level: AlertLevel,
    pub eyes_closed_count: u64,
    pub elapsed_seconds: u64,
}

impl AlertnessState {
    /// Alertness score, one point lost per eyes-closed event
    pub fn alertness_percent(&self) -> u8 {
        100u64.saturating_sub(self.eyes_closed_count) as u8
    }

    /// Elapsed driving time as `MM:SS`
    pub fn driving_time(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.elapsed_seconds / 60,
            self.elapsed_seconds % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driving_time_format() {
        let state = AlertnessState {
            elapsed_seconds: 0,
            ..Default::default()
        };
        assert_eq!(state.driving_time(), "00:00");

        let state = AlertnessState {
            elapsed_seconds: 754,
            ..Default::default()
        };
        assert_eq!(state.driving_time(), "12:34");

        let state = AlertnessState {
            elapsed_seconds: 6000,
            ..Default::default()
        };
        assert_eq!(state.driving_time(), "100:00");
    }

    #[test]
    fn test_alertness_percent_floors_at_zero() {
        let state = AlertnessState {
            eyes_closed_count: 7,
            ..Default::default()
        };
        assert_eq!(state.alertness_percent(), 93);

        let state = AlertnessState {
            eyes_closed_count: 250,
            ..Default::default()
        };
        assert_eq!(state.alertness_percent(), 0);
    }
}
