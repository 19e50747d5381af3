//! Frame Sampler
//!
//! Captures the cabin camera on a fixed cadence, JPEG-encodes each frame and
//! hands it to the analyzer link. Ticks are silent no-ops while the link is
//! not connected; repeated capture failures escalate to a degraded-capture
//! notification.

mod sampler;

pub use sampler::{FrameSampler, SamplerConfig, SamplerEvent, SamplerStats, SamplerSummary};
