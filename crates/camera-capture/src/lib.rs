//! Camera Capture Library for the Dashcam Pipeline
//!
//! Provides decoded video frames from recorded dashcam footage and
//! samples them at a fixed real-world rate.
//! Supports:
//! - Image-sequence directories (one decoded image per frame)
//! - Synthetic `stub://` sources for dry runs and tests
//! - Video files through FFmpeg (`ffmpeg` feature)

pub mod frame;
pub mod sampler;
pub mod sequence;
pub mod source;
pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use frame::VideoFrame;
pub use sampler::{sample_interval, FrameSampler, SampledFrame};
pub use sequence::ImageSequenceSource;
pub use source::{open_source, SourceInfo, VideoSource};
pub use synthetic::SyntheticSource;

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Video source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl CameraError {
    pub(crate) fn unavailable(path: impl Into<String>, reason: impl ToString) -> Self {
        CameraError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Options used when opening a source
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Frame rate assumed for sources that do not report one
    /// (image sequences). `None` leaves the rate unknown.
    pub fallback_fps: Option<f64>,
}
