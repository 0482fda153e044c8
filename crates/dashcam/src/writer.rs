//! Frame persistence

use camera_capture::VideoFrame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::PipelineError;

/// `frame_00042.jpg`
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:05}.jpg")
}

/// Image write capability. Never creates directories.
pub trait FrameWriter {
    fn write(&mut self, path: &Path, frame: &VideoFrame) -> Result<(), PipelineError>;
}

/// JPEG writer.
///
/// Each file is written under a temporary name and renamed into place, so
/// an interrupted run never leaves a truncated frame behind.
#[derive(Debug, Clone)]
pub struct JpegWriter {
    quality: u8,
}

impl JpegWriter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, PipelineError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.quality)
            .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

impl Default for JpegWriter {
    fn default() -> Self {
        Self::new(95)
    }
}

impl FrameWriter for JpegWriter {
    fn write(&mut self, path: &Path, frame: &VideoFrame) -> Result<(), PipelineError> {
        let bytes = self.encode(frame)?;

        let mut partial = PathBuf::from(path);
        partial.set_extension("jpg.part");

        fs::write(&partial, &bytes).map_err(|e| PipelineError::io(&partial, e))?;
        if let Err(e) = fs::rename(&partial, path) {
            let _ = fs::remove_file(&partial);
            return Err(PipelineError::io(path, e));
        }

        trace!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}
