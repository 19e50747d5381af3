//! Synthetic cabin camera
//!
//! Renders a moving gradient test pattern. Used by the service binary when no
//! capture driver is wired in, and by tests that need to observe acquire and
//! release calls or inject capture failures.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, CaptureHandle, CaptureSource, VideoFrame};

/// Test-pattern capture source
pub struct SyntheticCamera {
    config: CameraConfig,
    /// Handle currently held, if any (the device is exclusive)
    held: Mutex<Option<u64>>,
    next_handle: AtomicU64,
    frame_counter: AtomicU64,
    acquire_count: AtomicUsize,
    release_count: AtomicUsize,
    /// Remaining captures to fail
    pending_failures: AtomicU32,
    /// Simulated sensor readout time (milliseconds)
    capture_delay_ms: AtomicU64,
    /// Report an error from the next release
    fail_release: AtomicBool,
    /// Refuse acquisition (simulates a missing device or denied permission)
    unavailable: bool,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        info!(
            "Creating synthetic camera {} ({}x{})",
            config.device, config.width, config.height
        );
        Self {
            config,
            held: Mutex::new(None),
            next_handle: AtomicU64::new(1),
            frame_counter: AtomicU64::new(0),
            acquire_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
            pending_failures: AtomicU32::new(0),
            capture_delay_ms: AtomicU64::new(0),
            fail_release: AtomicBool::new(false),
            unavailable: false,
        }
    }

    /// Camera whose acquisition always fails
    pub fn unavailable(config: CameraConfig) -> Self {
        Self {
            unavailable: true,
            ..Self::new(config)
        }
    }

    /// Make the next `count` captures fail as unreadable
    pub fn fail_next_captures(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Block every capture for `delay` before returning the frame
    pub fn set_capture_delay(&self, delay: Duration) {
        self.capture_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make the next release report a driver error (the device still closes)
    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    /// Number of handles currently held (0 or 1)
    pub fn active_handles(&self) -> usize {
        match self.held.lock() {
            Ok(held) => usize::from(held.is_some()),
            Err(poisoned) => usize::from(poisoned.into_inner().is_some()),
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    fn render(&self, tick: u64) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let shift = (tick % 256) as u32;
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push(((x * 255 / w.max(1) + shift) % 256) as u8);
                data.push(((y * 255 / h.max(1)) % 256) as u8);
                data.push((shift * 3 % 256) as u8);
            }
        }
        data
    }
}

impl CaptureSource for SyntheticCamera {
    fn acquire(&self) -> Result<CaptureHandle, CameraError> {
        if self.unavailable {
            return Err(CameraError::Open(format!(
                "{}: device not available",
                self.config.device
            )));
        }

        let mut held = self
            .held
            .lock()
            .map_err(|_| CameraError::Open("camera state poisoned".into()))?;
        if held.is_some() {
            return Err(CameraError::Busy(self.config.device.clone()));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        *held = Some(id);
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        debug!("Synthetic camera acquired (handle {})", id);
        Ok(CaptureHandle::new(id, self.config.device.clone()))
    }

    fn capture_frame(&self, handle: &CaptureHandle) -> Result<VideoFrame, CameraError> {
        let held = self
            .held
            .lock()
            .map_err(|_| CameraError::Unreadable("camera state poisoned".into()))?;
        if *held != Some(handle.id()) {
            return Err(CameraError::NotInitialized);
        }
        drop(held);

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CameraError::Unreadable("injected capture failure".into()));
        }

        let delay = self.capture_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let tick = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        Ok(VideoFrame::new(
            self.render(tick),
            self.config.width,
            self.config.height,
            Utc::now(),
        ))
    }

    fn release(&self, handle: CaptureHandle) -> Result<(), CameraError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| CameraError::Open("camera state poisoned".into()))?;
        if *held == Some(handle.id()) {
            *held = None;
            self.release_count.fetch_add(1, Ordering::SeqCst);
            debug!("Synthetic camera released (handle {})", handle.id());
        }
        if self.fail_release.swap(false, Ordering::SeqCst) {
            return Err(CameraError::Release(format!(
                "{}: close reported an error",
                self.config.device
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CameraConfig {
        CameraConfig {
            device: "synthetic0".into(),
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn test_frames_match_configured_size() {
        let camera = SyntheticCamera::new(small());
        let handle = camera.acquire().unwrap();
        let frame = camera.capture_frame(&handle).unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let camera = SyntheticCamera::new(small());
        let handle = camera.acquire().unwrap();
        camera.fail_next_captures(2);
        assert!(camera.capture_frame(&handle).is_err());
        assert!(camera.capture_frame(&handle).is_err());
        assert!(camera.capture_frame(&handle).is_ok());
    }

    #[test]
    fn test_stale_handle_rejected() {
        let camera = SyntheticCamera::new(small());
        let handle = camera.acquire().unwrap();
        let stale = CaptureHandle::new(handle.id(), "synthetic0");
        camera.release(handle).unwrap();
        assert!(matches!(
            camera.capture_frame(&stale),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_unavailable_camera_refuses_acquire() {
        let camera = SyntheticCamera::unavailable(small());
        assert!(matches!(camera.acquire(), Err(CameraError::Open(_))));
        assert_eq!(camera.acquire_count(), 0);
    }

    #[test]
    fn test_failed_release_still_frees_device() {
        let camera = SyntheticCamera::new(small());
        let handle = camera.acquire().unwrap();
        camera.fail_next_release();

        assert!(matches!(camera.release(handle), Err(CameraError::Release(_))));
        assert_eq!(camera.active_handles(), 0);

        let handle = camera.acquire().unwrap();
        assert!(camera.release(handle).is_ok());
    }
}
