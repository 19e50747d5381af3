//! Frame Sampler Implementation

use analyzer_link::{Frame, FrameSink};
use camera_capture::{CameraError, CaptureLease};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the frame sampler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sampling cadence in milliseconds (default: 100)
    pub interval_ms: u64,
    /// Consecutive capture failures before reporting degraded capture
    pub degraded_threshold: u32,
    /// Width frames are scaled to before encoding
    pub output_width: u32,
    /// Height frames are scaled to before encoding
    pub output_height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            degraded_threshold: 3,
            output_width: 640,
            output_height: 480,
            jpeg_quality: 80,
        }
    }
}

/// Notifications for the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEvent {
    /// Capture kept failing past the threshold
    DegradedCapture {
        consecutive_failures: u32,
        last_error: String,
    },
    /// A capture succeeded after a degraded stretch
    CaptureRecovered,
}

/// Sampler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub dropped_offline: u64,
    pub dropped_send: u64,
    pub capture_errors: u64,
}

/// Outcome of a finished sampler
#[derive(Debug)]
pub struct SamplerSummary {
    pub stats: SamplerStats,
    /// Result of releasing the capture handle
    pub release: Result<(), CameraError>,
}

/// Samples frames for the lifetime of one session
pub struct FrameSampler {
    config: SamplerConfig,
    /// Shared with in-flight blocking captures
    lease: Arc<CaptureLease>,
    sink: Arc<dyn FrameSink>,
    events: mpsc::UnboundedSender<SamplerEvent>,
    cancel: CancellationToken,
    /// Next sequence number
    sequence: u64,
    consecutive_failures: u32,
    degraded: bool,
    stats: SamplerStats,
}

impl FrameSampler {
    /// Create a sampler holding `lease` until it stops
    pub fn new(
        config: SamplerConfig,
        lease: CaptureLease,
        sink: Arc<dyn FrameSink>,
        events: mpsc::UnboundedSender<SamplerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            lease: Arc::new(lease),
            sink,
            events,
            cancel,
            sequence: 0,
            consecutive_failures: 0,
            degraded: false,
            stats: SamplerStats::default(),
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<SamplerSummary> {
        tokio::spawn(self.run())
    }

    /// Sample until cancelled, then release the capture handle
    pub async fn run(mut self) -> SamplerSummary {
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        info!("Starting frame sampler every {:?}", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.tick().await;
        }

        let FrameSampler { lease, stats, .. } = self;
        let release = match Arc::try_unwrap(lease) {
            Ok(lease) => lease.release(),
            // A capture is still running on the blocking pool; the lease
            // releases itself when that capture finishes.
            Err(_) => Ok(()),
        };
        if let Err(e) = &release {
            warn!("Capture release failed: {}", e);
        }
        info!(
            "Frame sampler stopped: {} sent, {} dropped offline, {} dropped on send, {} capture errors",
            stats.frames_sent, stats.dropped_offline, stats.dropped_send, stats.capture_errors
        );
        SamplerSummary { stats, release }
    }

    /// One sampling step
    pub async fn tick(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.stats.ticks += 1;

        if !self.sink.connection_state().is_connected() {
            self.stats.dropped_offline += 1;
            metrics::counter!("frames_dropped_total", "reason" => "offline").increment(1);
            return;
        }

        let (payload, captured_at) = match self.capture().await {
            Ok(encoded) => encoded,
            Err(e) => {
                self.on_capture_error(e);
                return;
            }
        };
        self.on_capture_ok();

        // Stopped while encoding
        if self.cancel.is_cancelled() {
            return;
        }

        let sequence = self.sequence;
        self.sequence += 1;
        let frame = Frame {
            payload,
            captured_at,
            sequence,
        };

        match self.sink.send(frame).await {
            Ok(()) => {
                self.stats.frames_sent += 1;
            }
            Err(e) if e.is_drop() => {
                self.stats.dropped_send += 1;
                debug!("Frame {} dropped: {}", sequence, e);
                metrics::counter!("frames_dropped_total", "reason" => "send").increment(1);
            }
            Err(e) => {
                self.stats.dropped_send += 1;
                warn!("Frame {} could not be sent: {}", sequence, e);
                metrics::counter!("frames_dropped_total", "reason" => "encode").increment(1);
            }
        }
    }

    /// Capture, scale and encode on the blocking pool
    async fn capture(&self) -> Result<(Vec<u8>, DateTime<Utc>), CameraError> {
        let lease = Arc::clone(&self.lease);
        let (width, height) = (self.config.output_width, self.config.output_height);
        let quality = self.config.jpeg_quality;

        tokio::task::spawn_blocking(move || encode_frame(&lease, width, height, quality))
            .await
            .map_err(|e| CameraError::Unreadable(format!("capture task failed: {}", e)))?
    }

    fn on_capture_error(&mut self, error: CameraError) {
        self.stats.capture_errors += 1;
        self.consecutive_failures += 1;
        metrics::counter!("capture_errors_total").increment(1);
        warn!(
            "Capture failed ({} in a row): {}",
            self.consecutive_failures, error
        );

        if !self.degraded && self.consecutive_failures >= self.config.degraded_threshold {
            self.degraded = true;
            warn!(
                "Capture degraded after {} consecutive failures",
                self.consecutive_failures
            );
            let _ = self.events.send(SamplerEvent::DegradedCapture {
                consecutive_failures: self.consecutive_failures,
                last_error: error.to_string(),
            });
        }
    }

    fn on_capture_ok(&mut self) {
        self.consecutive_failures = 0;
        if self.degraded {
            self.degraded = false;
            info!("Capture recovered");
            let _ = self.events.send(SamplerEvent::CaptureRecovered);
        }
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}

fn encode_frame(
    lease: &CaptureLease,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<(Vec<u8>, DateTime<Utc>), CameraError> {
    let raw = lease.capture()?;
    raw.validate()?;
    let jpeg = raw.resize(width, height).encode_jpeg(quality)?;
    Ok((jpeg, raw.captured_at))
}
