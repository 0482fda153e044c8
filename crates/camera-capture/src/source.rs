//! Video source capability

use std::path::Path;
use tracing::info;

use crate::frame::VideoFrame;
use crate::sequence::ImageSequenceSource;
use crate::synthetic::SyntheticSource;
use crate::{CameraError, SourceOptions};

/// Stream properties reported when a source is opened
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Path the source was opened from
    pub path: String,
    /// Nominal frame rate, if the container reports one
    pub fps: Option<f64>,
    /// Total frame count, if known
    pub frame_count: Option<u64>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
}

/// A readable stream of decoded frames.
///
/// Frames come out in presentation order; once read they cannot be read
/// again without reopening the source.
pub trait VideoSource: Send {
    /// Stream properties
    fn info(&self) -> &SourceInfo;

    /// Next decoded frame, or `None` at end of stream
    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Release the underlying handle. Sources do not close themselves on
    /// drop; the owning [`FrameSampler`](crate::FrameSampler) does. Must be idempotent.
    fn close(&mut self) {}
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn info(&self) -> &SourceInfo {
        (**self).info()
    }

    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Open a source by path.
///
/// - `stub://...` opens a synthetic source
/// - a directory opens an image sequence
/// - any other file is decoded with FFmpeg (requires the `ffmpeg` feature)
pub fn open_source(
    path: &str,
    options: &SourceOptions,
) -> Result<Box<dyn VideoSource>, CameraError> {
    if path.starts_with(SyntheticSource::SCHEME) {
        return Ok(Box::new(SyntheticSource::parse(path)?));
    }

    let fs_path = Path::new(path);
    if !fs_path.exists() {
        return Err(CameraError::unavailable(path, "no such file or directory"));
    }

    if fs_path.is_dir() {
        let source = ImageSequenceSource::open(fs_path, options.fallback_fps)?;
        return Ok(Box::new(source));
    }

    open_video_file(path)
}

#[cfg(feature = "ffmpeg")]
fn open_video_file(path: &str) -> Result<Box<dyn VideoSource>, CameraError> {
    let source = crate::ffmpeg::FfmpegSource::open(path)?;
    info!("Opened video file {}", path);
    Ok(Box::new(source))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video_file(path: &str) -> Result<Box<dyn VideoSource>, CameraError> {
    info!("Video file decoding is not compiled in");
    Err(CameraError::unavailable(
        path,
        "video file decoding requires the ffmpeg feature",
    ))
}
