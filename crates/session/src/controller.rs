//! Session Controller Implementation

use std::sync::Arc;
use std::time::Duration;

use alertness::AlertnessState;
use analyzer_link::{AnalyzerLink, FrameSink};
use camera_capture::{CaptureLease, CaptureSource};
use chrono::Utc;
use frame_sampler::{FrameSampler, SamplerStats, SamplerSummary};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::worker::SessionWorker;
use crate::{
    reconnect, SessionConfig, SessionError, SessionSnapshot, SessionState, SessionStatus,
    ShutdownError, SnapshotReader,
};

/// Resources owned by the running session
struct ActiveSession {
    id: Uuid,
    link: Arc<AnalyzerLink>,
    /// Cancels every session task when dropped, even mid-`stop`
    cancel: DropGuard,
    sampler: JoinHandle<SamplerSummary>,
    worker: JoinHandle<AlertnessState>,
    reconnect: Option<JoinHandle<()>>,
    synthetic: Option<JoinHandle<()>>,
}

/// What a stopped session left behind
#[derive(Debug, Default, Serialize)]
pub struct StopReport {
    pub session_id: Option<Uuid>,
    /// Alertness at the moment the session stopped
    pub final_state: Option<AlertnessState>,
    pub sampler: Option<SamplerStats>,
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ShutdownError>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[ShutdownError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

/// Drives one monitoring session at a time
pub struct SessionController {
    config: SessionConfig,
    capture: Arc<dyn CaptureSource>,
    snapshot: watch::Sender<SessionSnapshot>,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(config: SessionConfig, capture: Arc<dyn CaptureSource>) -> Result<Self, SessionError> {
        config.validate()?;
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Ok(Self {
            config,
            capture,
            snapshot,
            active: None,
        })
    }

    /// Read handle that stays valid across sessions
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(self.snapshot.subscribe())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().session.status
    }

    /// Start a session
    ///
    /// Fails without side effects when a session is already running or
    /// the capture source cannot be acquired. An unreachable analyzer is
    /// not an error: the session starts offline and keeps retrying.
    pub async fn start(&mut self) -> Result<SessionSnapshot, SessionError> {
        if self.active.is_some() || self.status() != SessionStatus::Idle {
            return Err(SessionError::AlreadyActive);
        }

        let lease = CaptureLease::acquire(Arc::clone(&self.capture))?;
        let id = Uuid::new_v4();
        info!("Starting monitoring session {}", id);

        let (link, link_events) = AnalyzerLink::new(self.config.link.clone());
        let link = Arc::new(link);
        let connection = link.subscribe();
        let endpoint = self.config.link.endpoint.clone();

        let offline = match link.connect(&endpoint).await {
            Ok(_) => false,
            Err(e) => {
                warn!("Analyzer unavailable ({}), starting offline", e);
                true
            }
        };

        let cancel = CancellationToken::new();

        let (sampler_tx, sampler_events) = mpsc::unbounded_channel();
        let sink: Arc<dyn FrameSink> = link.clone();
        let sampler = FrameSampler::new(
            self.config.sampler.clone(),
            lease,
            sink,
            sampler_tx,
            cancel.child_token(),
        )
        .spawn();

        let source = &self.config.signal_source;
        let (synthetic_rx, synthetic) = match source.generator() {
            Some(generator) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let task = tokio::spawn(generator.run(tx, cancel.child_token()));
                (Some(rx), Some(task))
            }
            None => (None, None),
        };

        let aggregator = source.aggregator(self.config.alertness.clone(), Instant::now());
        let alertness = aggregator.state();
        let started_at = Utc::now();
        self.snapshot.send_replace(SessionSnapshot {
            session: SessionState {
                status: SessionStatus::Active,
                session_id: Some(id),
                started_at: Some(started_at),
                elapsed_seconds: 0,
                offline,
                capture_degraded: false,
            },
            alertness,
            connection: link.state(),
        });

        let worker = SessionWorker {
            aggregator,
            analyzer_signals: source.requires_analyzer(),
            snapshot: self.snapshot.clone(),
            connection,
            link_events,
            synthetic: synthetic_rx,
            sampler_events,
            tick_period: Duration::from_millis(self.config.timing.tick_interval_ms),
            cancel: cancel.child_token(),
        }
        .spawn();

        let reconnect = self.config.reconnect.enabled.then(|| {
            tokio::spawn(reconnect::run(
                Arc::clone(&link),
                endpoint,
                self.config.reconnect.clone(),
                cancel.child_token(),
            ))
        });

        self.active = Some(ActiveSession {
            id,
            link,
            cancel: cancel.drop_guard(),
            sampler,
            worker,
            reconnect,
            synthetic,
        });

        metrics::gauge!("session_active").set(1.0);
        Ok(self.snapshot())
    }

    /// Stop the running session
    ///
    /// Always ends in `Idle`. Failures of individual teardown steps are
    /// collected in the report instead of aborting the remaining steps.
    /// Stopping an idle controller is a no-op.
    pub async fn stop(&mut self) -> StopReport {
        let Some(active) = self.active.take() else {
            if self.status() != SessionStatus::Idle {
                self.snapshot.send_replace(SessionSnapshot::default());
            }
            return StopReport::default();
        };

        info!("Stopping monitoring session {}", active.id);
        self.snapshot
            .send_modify(|s| s.session.status = SessionStatus::Stopping);

        let budget = Duration::from_millis(self.config.timing.shutdown_timeout_ms);
        let mut errors = Vec::new();

        drop(active.cancel);

        let summary = join_task("sampler", active.sampler, budget, &mut errors).await;
        let sampler = summary.map(|summary| {
            if let Err(e) = summary.release {
                errors.push(ShutdownError::CaptureRelease(e.to_string()));
            }
            summary.stats
        });

        if let Some(task) = active.synthetic {
            join_task("signal generator", task, budget, &mut errors).await;
        }
        if let Some(task) = active.reconnect {
            join_task("reconnect", task, budget, &mut errors).await;
        }

        active.link.disconnect().await;

        let final_state = join_task("session worker", active.worker, budget, &mut errors).await;

        self.snapshot.send_replace(SessionSnapshot::default());
        metrics::gauge!("session_active").set(0.0);

        if errors.is_empty() {
            info!("Session {} stopped", active.id);
        } else {
            warn!(
                "Session {} stopped with {} teardown errors",
                active.id,
                errors.len()
            );
        }

        StopReport {
            session_id: Some(active.id),
            final_state,
            sampler,
            errors,
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Controller dropped with session {} active", active.id);
        }
    }
}

async fn join_task<T>(
    task: &'static str,
    mut handle: JoinHandle<T>,
    budget: Duration,
    errors: &mut Vec<ShutdownError>,
) -> Option<T> {
    match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{} task failed: {}", task, e);
            errors.push(ShutdownError::Task {
                task,
                reason: e.to_string(),
            });
            None
        }
        Err(_) => {
            handle.abort();
            let timeout_ms = budget.as_millis() as u64;
            warn!("{} task did not stop within {}ms", task, timeout_ms);
            errors.push(ShutdownError::Timeout { task, timeout_ms });
            None
        }
    }
}
