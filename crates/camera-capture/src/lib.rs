//! Camera Capture Library for Driver Monitoring
//!
//! Defines the boundary to the cabin capture device:
//! - `CaptureSource` trait (acquire / capture / release)
//! - `CaptureLease` holding a handle for the lifetime of a sampler
//! - Synthetic test-pattern camera for running without hardware
//! - Raw RGB frames with JPEG encoding

pub mod frame;
pub mod synthetic;

pub use frame::VideoFrame;
pub use synthetic::SyntheticCamera;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera busy: {0} is already acquired")]
    Busy(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame unreadable: {0}")]
    Unreadable(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Camera not initialized")]
    NotInitialized,

    #[error("Failed to release camera: {0}")]
    Release(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Opaque handle to an acquired capture device
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureHandle {
    id: u64,
    device: String,
}

impl CaptureHandle {
    pub fn new(id: u64, device: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

/// A video capture device.
///
/// Implementations own the device driver and its permission model; callers
/// only see handles and raw RGB frames.
pub trait CaptureSource: Send + Sync {
    /// Open the device and return a handle for subsequent captures
    fn acquire(&self) -> Result<CaptureHandle, CameraError>;

    /// Grab the current frame
    fn capture_frame(&self, handle: &CaptureHandle) -> Result<VideoFrame, CameraError>;

    /// Close the device
    fn release(&self, handle: CaptureHandle) -> Result<(), CameraError>;
}

/// An acquired capture handle, released when the lease is dropped.
pub struct CaptureLease {
    source: Arc<dyn CaptureSource>,
    handle: Option<CaptureHandle>,
}

impl CaptureLease {
    /// Acquire the device behind `source`
    pub fn acquire(source: Arc<dyn CaptureSource>) -> Result<Self, CameraError> {
        let handle = source.acquire()?;
        debug!("Capture handle {} acquired on {}", handle.id(), handle.device());
        Ok(Self {
            source,
            handle: Some(handle),
        })
    }

    /// Capture one frame through the held handle
    pub fn capture(&self) -> Result<VideoFrame, CameraError> {
        let handle = self.handle.as_ref().ok_or(CameraError::NotInitialized)?;
        self.source.capture_frame(handle)
    }

    /// Release the handle, reporting any driver error
    pub fn release(mut self) -> Result<(), CameraError> {
        match self.handle.take() {
            Some(handle) => {
                debug!("Releasing capture handle {}", handle.id());
                self.source.release(handle)
            }
            None => Ok(()),
        }
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let id = handle.id();
            if let Err(e) = self.source.release(handle) {
                warn!("Failed to release capture handle {}: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_releases_on_drop() {
        let camera = Arc::new(SyntheticCamera::new(CameraConfig::default()));
        {
            let lease = CaptureLease::acquire(camera.clone()).unwrap();
            assert_eq!(camera.active_handles(), 1);
            assert!(lease.capture().is_ok());
        }
        assert_eq!(camera.active_handles(), 0);
        assert_eq!(camera.release_count(), 1);
    }

    #[test]
    fn test_explicit_release_is_not_repeated_on_drop() {
        let camera = Arc::new(SyntheticCamera::new(CameraConfig::default()));
        let lease = CaptureLease::acquire(camera.clone()).unwrap();
        lease.release().unwrap();
        assert_eq!(camera.release_count(), 1);
        assert_eq!(camera.active_handles(), 0);
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let camera = Arc::new(SyntheticCamera::new(CameraConfig::default()));
        let _lease = CaptureLease::acquire(camera.clone()).unwrap();
        assert!(matches!(
            CaptureLease::acquire(camera.clone()),
            Err(CameraError::Busy(_))
        ));
    }
}
