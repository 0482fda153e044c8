//! Image-sequence source
//!
//! Reads a directory of still images as consecutive frames, ordered by file
//! name. Dashcams that dump JPEG bursts and pre-extracted clips both end up
//! in this shape.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::frame::{timestamp_for, VideoFrame};
use crate::source::{SourceInfo, VideoSource};
use crate::CameraError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Directory of images read as a video stream
pub struct ImageSequenceSource {
    info: SourceInfo,
    files: Vec<PathBuf>,
    position: usize,
    closed: bool,
}

impl ImageSequenceSource {
    /// Open `dir`. `fps` is the rate the frames were captured at, if known.
    pub fn open(dir: &Path, fps: Option<f64>) -> Result<Self, CameraError> {
        let dir_name = dir.display().to_string();
        let entries = std::fs::read_dir(dir).map_err(|e| CameraError::unavailable(&dir_name, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        let first = files.first().ok_or_else(|| {
            CameraError::unavailable(&dir_name, "directory contains no image frames")
        })?;
        let (width, height) =
            image::image_dimensions(first).map_err(|e| CameraError::unavailable(&dir_name, e))?;

        info!(
            "Opened image sequence {} ({} frames, {}x{})",
            dir_name,
            files.len(),
            width,
            height
        );

        Ok(Self {
            info: SourceInfo {
                path: dir_name,
                fps,
                frame_count: Some(files.len() as u64),
                width,
                height,
            },
            files,
            position: 0,
            closed: false,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoSource for ImageSequenceSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.closed {
            return Ok(None);
        }
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };

        let image = image::open(path)
            .map_err(|e| CameraError::Decode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        let sequence = self.position as u64;
        self.position += 1;
        Ok(Some(VideoFrame::from_image(
            image,
            timestamp_for(sequence, self.info.fps),
            sequence,
        )))
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing image sequence {}", self.info.path);
            self.closed = true;
        }
    }
}
