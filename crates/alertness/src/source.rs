//! Where eye-state signals come from

use serde::{Deserialize, Serialize};

use crate::{AlertnessConfig, AlertnessAggregator, SyntheticConfig, SyntheticGenerator};
use tokio::time::Instant;

/// Signal source feeding the aggregator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSource {
    /// Signals decoded from the remote analyzer connection
    #[default]
    RealAnalyzer,
    /// Locally generated signals for running without an analyzer
    SyntheticGenerator(SyntheticConfig),
}

impl SignalSource {
    /// Whether alert signals depend on the analyzer connection
    pub fn requires_analyzer(&self) -> bool {
        matches!(self, SignalSource::RealAnalyzer)
    }

    /// Generator for synthetic sources
    pub fn generator(&self) -> Option<SyntheticGenerator> {
        match self {
            SignalSource::RealAnalyzer => None,
            SignalSource::SyntheticGenerator(config) => Some(SyntheticGenerator::new(config)),
        }
    }

    /// Aggregator configured for this source
    pub fn aggregator(&self, config: AlertnessConfig, now: Instant) -> AlertnessAggregator {
        let aggregator = AlertnessAggregator::new(config, now);
        if self.requires_analyzer() {
            aggregator
        } else {
            aggregator.without_analyzer()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_analyzer_has_no_generator() {
        assert!(SignalSource::RealAnalyzer.requires_analyzer());
        assert!(SignalSource::RealAnalyzer.generator().is_none());
    }

    #[test]
    fn test_synthetic_source_builds_generator() {
        let source = SignalSource::SyntheticGenerator(SyntheticConfig::default());
        assert!(!source.requires_analyzer());
        assert!(source.generator().is_some());
    }

    #[test]
    fn test_synthetic_aggregator_skips_fallback() {
        let t0 = Instant::now();
        let source = SignalSource::SyntheticGenerator(SyntheticConfig::default());
        let mut aggregator = source.aggregator(AlertnessConfig::default(), t0);
        assert_eq!(
            aggregator.on_tick(t0 + std::time::Duration::from_secs(30)),
            crate::AlertLevel::Normal
        );
    }
}
