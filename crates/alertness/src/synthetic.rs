//! Synthetic eye-state signal generator
//!
//! Produces a believable signal stream without a real analyzer: once per
//! period the eyes are reported closed with a fixed probability, open
//! otherwise.

use analyzer_link::AlertSignal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::AlertnessError;

/// Synthetic generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Chance of an eyes-closed signal per period (0.0 - 1.0)
    pub eyes_closed_probability: f64,
    /// Interval between generated signals (milliseconds)
    pub period_ms: u64,
    /// Fixed seed for reproducible streams
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            eyes_closed_probability: 0.1,
            period_ms: 1000,
            seed: None,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), AlertnessError> {
        let p = self.eyes_closed_probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(AlertnessError::Config(format!(
                "eyes_closed_probability must be within 0.0 - 1.0, got {}",
                p
            )));
        }
        if self.period_ms == 0 {
            return Err(AlertnessError::Config("period_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Random eye-state source
pub struct SyntheticGenerator {
    probability: f64,
    period: Duration,
    rng: StdRng,
}

impl SyntheticGenerator {
    pub fn new(config: &SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability: clamp_probability(config.eyes_closed_probability),
            period: Duration::from_millis(config.period_ms.max(1)),
            rng,
        }
    }

    /// Draw the next observation
    pub fn next_signal(&mut self) -> AlertSignal {
        if self.rng.gen_bool(self.probability) {
            AlertSignal::eyes_closed()
        } else {
            AlertSignal::eyes_open()
        }
    }

    /// Emit one signal per period until cancelled or the receiver goes away
    pub async fn run(mut self, tx: mpsc::UnboundedSender<AlertSignal>, cancel: CancellationToken) {
        info!(
            "Synthetic signal generator running (p={}, period={:?})",
            self.probability, self.period
        );
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.period,
            self.period,
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let signal = self.next_signal();
            debug!("Synthetic signal {:?}", signal.kind);
            if tx.send(signal).is_err() {
                break;
            }
        }
        debug!("Synthetic signal generator stopped");
    }
}

/// NaN would pass `clamp` and panic in `gen_bool`
fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_link::SignalKind;

    fn closed_count(config: &SyntheticConfig, draws: usize) -> usize {
        let mut generator = SyntheticGenerator::new(config);
        (0..draws)
            .filter(|_| generator.next_signal().kind == SignalKind::EyesClosed)
            .count()
    }

    #[test]
    fn test_seeded_streams_repeat() {
        let config = SyntheticConfig {
            seed: Some(7),
            ..Default::default()
        };
        let mut a = SyntheticGenerator::new(&config);
        let mut b = SyntheticGenerator::new(&config);
        for _ in 0..50 {
            assert_eq!(a.next_signal().kind, b.next_signal().kind);
        }
    }

    #[test]
    fn test_probability_extremes() {
        let never = SyntheticConfig {
            eyes_closed_probability: 0.0,
            seed: Some(1),
            ..Default::default()
        };
        let always = SyntheticConfig {
            eyes_closed_probability: 1.0,
            seed: Some(1),
            ..Default::default()
        };
        assert_eq!(closed_count(&never, 100), 0);
        assert_eq!(closed_count(&always, 100), 100);
    }

    #[test]
    fn test_out_of_range_probability_is_clamped() {
        let config = SyntheticConfig {
            eyes_closed_probability: 3.5,
            seed: Some(1),
            ..Default::default()
        };
        assert_eq!(closed_count(&config, 10), 10);
    }

    #[test]
    fn test_nan_probability_never_closes() {
        let config = SyntheticConfig {
            eyes_closed_probability: f64::NAN,
            seed: Some(1),
            ..Default::default()
        };
        assert_eq!(closed_count(&config, 20), 0);
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        for p in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            let config = SyntheticConfig {
                eyes_closed_probability: p,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(AlertnessError::Config(_))),
                "accepted {}",
                p
            );
        }
        assert!(SyntheticConfig::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_once_per_period() {
        let config = SyntheticConfig {
            eyes_closed_probability: 1.0,
            period_ms: 1000,
            seed: Some(3),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(SyntheticGenerator::new(&config).run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }
}
