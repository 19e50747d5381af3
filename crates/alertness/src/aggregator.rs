//! Alertness aggregation
//!
//! Folds elapsed-time ticks, eye-state signals and connection changes into
//! an `AlertnessState`. Every input carries the instant it was applied at, so
//! the policy is a pure function of the input sequence.

use analyzer_link::{AlertSignal, ConnectionState, SignalKind};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{AlertLevel, AlertnessConfig, AlertnessState};

/// Per-session alertness state machine
pub struct AlertnessAggregator {
    config: AlertnessConfig,
    state: AlertnessState,
    /// Arrival instants of recent eyes-closed signals
    closed_window: VecDeque<Instant>,
    last_closed: Option<Instant>,
    connection: ConnectionState,
    /// Start of the current stretch without a connection
    disconnected_since: Option<Instant>,
    /// Whether signals depend on the remote analyzer
    requires_analyzer: bool,
}

impl AlertnessAggregator {
    /// Fresh state for a session starting at `now`, not yet connected
    pub fn new(config: AlertnessConfig, now: Instant) -> Self {
        Self {
            config,
            state: AlertnessState::default(),
            closed_window: VecDeque::new(),
            last_closed: None,
            connection: ConnectionState::Disconnected,
            disconnected_since: Some(now),
            requires_analyzer: true,
        }
    }

    /// Disable the unavailable-analyzer fallback (signals come from elsewhere)
    pub fn without_analyzer(mut self) -> Self {
        self.requires_analyzer = false;
        self
    }

    /// Discard all session state
    pub fn reset(&mut self, now: Instant) {
        let requires_analyzer = self.requires_analyzer;
        *self = Self::new(self.config.clone(), now);
        self.requires_analyzer = requires_analyzer;
    }

    /// One elapsed second
    pub fn on_tick(&mut self, now: Instant) -> AlertLevel {
        self.state.elapsed_seconds += 1;
        self.evaluate(now)
    }

    /// Apply an eye-state signal in arrival order
    pub fn on_signal(&mut self, signal: &AlertSignal, now: Instant) -> AlertLevel {
        match signal.kind {
            SignalKind::EyesClosed => {
                self.state.eyes_closed_count = self.state.eyes_closed_count.saturating_add(1);
                self.last_closed = Some(now);
                self.closed_window.push_back(now);
                debug!(
                    "Eyes closed (count {}, observed {})",
                    self.state.eyes_closed_count, signal.observed_at
                );
            }
            SignalKind::EyesOpen => {
                debug!("Eyes open (observed {})", signal.observed_at);
            }
        }
        self.evaluate(now)
    }

    /// Track analyzer connectivity for the unavailable fallback
    pub fn on_connection(&mut self, connection: ConnectionState, now: Instant) -> AlertLevel {
        self.connection = connection;
        if connection.is_connected() {
            self.disconnected_since = None;
        } else if self.disconnected_since.is_none() {
            self.disconnected_since = Some(now);
        }
        self.evaluate(now)
    }

    /// Recompute the level at `now`
    pub fn evaluate(&mut self, now: Instant) -> AlertLevel {
        let window = Duration::from_millis(self.config.escalation_window_ms);
        while let Some(&oldest) = self.closed_window.front() {
            if now.duration_since(oldest) > window {
                self.closed_window.pop_front();
            } else {
                break;
            }
        }

        let hold = Duration::from_millis(self.config.hold_period_ms);
        let held = self
            .last_closed
            .map(|last| now.duration_since(last) <= hold)
            .unwrap_or(false);

        let level = if self.analyzer_blind(now) {
            AlertLevel::AnalyzerUnavailable
        } else if held && self.closed_window.len() >= self.config.critical_signal_count {
            AlertLevel::Critical
        } else if held {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        };

        if level != self.state.level {
            info!("Alert level {} -> {}", self.state.level, level);
            metrics::counter!("alert_level_transitions_total", "to" => level.to_string())
                .increment(1);
            self.state.level = level;
        }
        level
    }

    fn analyzer_blind(&self, now: Instant) -> bool {
        if !self.requires_analyzer || self.connection.is_connected() {
            return false;
        }
        let grace = Duration::from_millis(self.config.grace_period_ms);
        self.disconnected_since
            .map(|since| now.duration_since(since) > grace)
            .unwrap_or(false)
    }

    pub fn state(&self) -> AlertnessState {
        self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn connected(start: Instant) -> AlertnessAggregator {
        let mut agg = AlertnessAggregator::new(AlertnessConfig::default(), start);
        agg.on_connection(ConnectionState::Connected, start);
        agg
    }

    #[test]
    fn test_ticks_and_two_signals_warn() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        for s in 1..=3 {
            agg.on_tick(t0 + secs(s as f64));
        }
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(3.5));
        agg.on_tick(t0 + secs(4.0));
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(4.5));
        agg.on_tick(t0 + secs(5.0));

        let state = agg.state();
        assert_eq!(state.elapsed_seconds, 5);
        assert_eq!(state.eyes_closed_count, 2);
        assert_eq!(state.level, AlertLevel::Warning);
    }

    #[test]
    fn test_three_signals_in_window_escalate() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        assert_eq!(
            agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(1.0)),
            AlertLevel::Warning
        );
        assert_eq!(
            agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(3.0)),
            AlertLevel::Warning
        );
        assert_eq!(
            agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(5.5)),
            AlertLevel::Critical
        );
    }

    #[test]
    fn test_signals_outside_window_do_not_escalate() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        agg.on_signal(&AlertSignal::eyes_closed(), t0);
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(6.0));
        let level = agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(12.0));
        assert_eq!(level, AlertLevel::Warning);
        assert_eq!(agg.state().eyes_closed_count, 3);
    }

    #[test]
    fn test_level_reverts_after_hold_period() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        agg.on_signal(&AlertSignal::eyes_closed(), t0);
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(0.5));
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(1.0));
        assert_eq!(agg.state().level, AlertLevel::Critical);

        assert_eq!(agg.on_tick(t0 + secs(3.0)), AlertLevel::Critical);
        assert_eq!(agg.on_tick(t0 + secs(4.5)), AlertLevel::Normal);
    }

    #[test]
    fn test_new_signal_extends_hold() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        agg.on_signal(&AlertSignal::eyes_closed(), t0);
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(2.5));
        assert_eq!(agg.on_tick(t0 + secs(4.0)), AlertLevel::Warning);
        assert_eq!(agg.on_tick(t0 + secs(6.0)), AlertLevel::Normal);
    }

    #[test]
    fn test_eyes_open_does_not_count() {
        let t0 = Instant::now();
        let mut agg = connected(t0);
        assert_eq!(
            agg.on_signal(&AlertSignal::eyes_open(), t0),
            AlertLevel::Normal
        );
        assert_eq!(agg.state().eyes_closed_count, 0);
    }

    #[test]
    fn test_never_connected_becomes_unavailable_after_grace() {
        let t0 = Instant::now();
        let mut agg = AlertnessAggregator::new(AlertnessConfig::default(), t0);

        for s in 1..=5 {
            assert_eq!(agg.on_tick(t0 + secs(s as f64)), AlertLevel::Normal);
        }
        assert_eq!(agg.on_tick(t0 + secs(6.0)), AlertLevel::AnalyzerUnavailable);
        assert_eq!(agg.state().eyes_closed_count, 0);
        assert_eq!(agg.state().elapsed_seconds, 6);
    }

    #[test]
    fn test_connection_loss_and_recovery() {
        let t0 = Instant::now();
        let mut agg = connected(t0);

        agg.on_connection(ConnectionState::Disconnected, t0 + secs(10.0));
        agg.on_connection(ConnectionState::Connecting, t0 + secs(12.0));
        assert_eq!(agg.on_tick(t0 + secs(15.0)), AlertLevel::Normal);
        assert_eq!(
            agg.on_tick(t0 + secs(16.0)),
            AlertLevel::AnalyzerUnavailable
        );

        assert_eq!(
            agg.on_connection(ConnectionState::Connected, t0 + secs(16.5)),
            AlertLevel::Normal
        );
    }

    #[test]
    fn test_synthetic_sessions_never_report_unavailable() {
        let t0 = Instant::now();
        let mut agg = AlertnessAggregator::new(AlertnessConfig::default(), t0).without_analyzer();
        assert_eq!(agg.on_tick(t0 + secs(60.0)), AlertLevel::Normal);
    }

    #[test]
    fn test_reset_clears_counters() {
        let t0 = Instant::now();
        let mut agg = connected(t0).without_analyzer();
        agg.on_tick(t0 + secs(1.0));
        agg.on_signal(&AlertSignal::eyes_closed(), t0 + secs(1.0));

        agg.reset(t0 + secs(2.0));
        assert_eq!(agg.state(), AlertnessState::default());
        assert_eq!(agg.on_tick(t0 + secs(30.0)), AlertLevel::Normal);
    }

    #[derive(Debug, Clone)]
    enum Input {
        Tick,
        Closed,
        Open,
        Link(bool),
    }

    fn input() -> impl Strategy<Value = (Input, u64)> {
        (
            prop_oneof![
                Just(Input::Tick),
                Just(Input::Closed),
                Just(Input::Open),
                any::<bool>().prop_map(Input::Link),
            ],
            0u64..2500,
        )
    }

    proptest! {
        #[test]
        fn eyes_closed_count_never_decreases(inputs in prop::collection::vec(input(), 1..200)) {
            let t0 = Instant::now();
            let mut agg = AlertnessAggregator::new(AlertnessConfig::default(), t0);
            let mut now = t0;
            let mut previous = 0;
            let mut closed = 0;

            for (input, gap_ms) in inputs {
                now += Duration::from_millis(gap_ms);
                match input {
                    Input::Tick => { agg.on_tick(now); }
                    Input::Closed => { closed += 1; agg.on_signal(&AlertSignal::eyes_closed(), now); }
                    Input::Open => { agg.on_signal(&AlertSignal::eyes_open(), now); }
                    Input::Link(up) => {
                        let state = if up { ConnectionState::Connected } else { ConnectionState::Disconnected };
                        agg.on_connection(state, now);
                    }
                }
                let count = agg.state().eyes_closed_count;
                prop_assert!(count >= previous);
                previous = count;
            }
            prop_assert_eq!(previous, closed);
        }

        #[test]
        fn quiet_connected_session_settles_to_normal(signals in 0usize..10, quiet_ms in 3001u64..20_000) {
            let t0 = Instant::now();
            let mut agg = connected(t0);
            for i in 0..signals {
                agg.on_signal(&AlertSignal::eyes_closed(), t0 + Duration::from_millis(i as u64 * 100));
            }
            let last = t0 + Duration::from_millis(signals.saturating_sub(1) as u64 * 100);
            prop_assert_eq!(agg.on_tick(last + Duration::from_millis(quiet_ms)), AlertLevel::Normal);
        }
    }
}
