//! Session worker
//!
//! Every input that changes session state (ticks, alert signals,
//! connection changes, sampler notices) is handled here, one at a time,
//! and each change is published as a whole snapshot.

use std::time::Duration;

use alertness::{AlertnessAggregator, AlertnessState};
use analyzer_link::{AlertSignal, ConnectionState, LinkEvent};
use frame_sampler::SamplerEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SessionSnapshot;

pub(crate) struct SessionWorker {
    pub aggregator: AlertnessAggregator,
    /// Accept signals arriving over the analyzer link
    pub analyzer_signals: bool,
    pub snapshot: watch::Sender<SessionSnapshot>,
    pub connection: watch::Receiver<ConnectionState>,
    pub link_events: mpsc::UnboundedReceiver<LinkEvent>,
    pub synthetic: Option<mpsc::UnboundedReceiver<AlertSignal>>,
    pub sampler_events: mpsc::UnboundedReceiver<SamplerEvent>,
    pub tick_period: Duration,
    pub cancel: CancellationToken,
}

impl SessionWorker {
    pub fn spawn(self) -> JoinHandle<AlertnessState> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> AlertnessState {
        let period = self.tick_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let initial = *self.connection.borrow_and_update();
        self.on_connection(initial);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.aggregator.on_tick(Instant::now());
                    self.publish();
                }
                Ok(()) = self.connection.changed() => {
                    let state = *self.connection.borrow_and_update();
                    self.on_connection(state);
                }
                Some(event) = self.link_events.recv() => self.on_link_event(event),
                Some(signal) = next_synthetic(&mut self.synthetic) => {
                    self.on_signal(&signal);
                }
                Some(event) = self.sampler_events.recv() => self.on_sampler_event(event),
            }
        }

        debug!("Session worker stopped");
        self.aggregator.state()
    }

    fn on_connection(&mut self, state: ConnectionState) {
        debug!("Analyzer connection {}", state);
        self.aggregator.on_connection(state, Instant::now());
        self.snapshot.send_modify(|s| {
            if state.is_connected() {
                s.session.offline = false;
            }
        });
        self.publish();
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Signal(signal) if self.analyzer_signals => self.on_signal(&signal),
            LinkEvent::Signal(signal) => {
                debug!("Ignoring analyzer {} signal in synthetic mode", signal.kind.as_str());
            }
            LinkEvent::ConnectionLost { reason } => {
                warn!("Analyzer connection lost: {}", reason);
            }
        }
    }

    fn on_signal(&mut self, signal: &AlertSignal) {
        metrics::counter!("analyzer_signals_total", "kind" => signal.kind.as_str()).increment(1);
        self.aggregator.on_signal(signal, Instant::now());
        self.publish();
    }

    fn on_sampler_event(&mut self, event: SamplerEvent) {
        let degraded = match event {
            SamplerEvent::DegradedCapture {
                consecutive_failures,
                last_error,
            } => {
                warn!(
                    "Capture degraded ({} consecutive failures): {}",
                    consecutive_failures, last_error
                );
                true
            }
            SamplerEvent::CaptureRecovered => {
                info!("Capture recovered");
                false
            }
        };
        self.snapshot.send_modify(|s| s.session.capture_degraded = degraded);
    }

    fn publish(&self) {
        let alertness = self.aggregator.state();
        let connection = self.aggregator.connection();
        self.snapshot.send_modify(|s| {
            s.alertness = alertness;
            s.connection = connection;
            s.session.elapsed_seconds = alertness.elapsed_seconds;
        });
    }
}

async fn next_synthetic(rx: &mut Option<mpsc::UnboundedReceiver<AlertSignal>>) -> Option<AlertSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
