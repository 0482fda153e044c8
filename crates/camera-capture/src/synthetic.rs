//! Synthetic frame source (`stub://`) for dry runs and tests

use tracing::debug;

use crate::frame::{timestamp_for, VideoFrame};
use crate::source::{SourceInfo, VideoSource};
use crate::CameraError;

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;

/// Deterministic gradient frames.
///
/// Path form: `stub://COUNT[@FPS][/WIDTHxHEIGHT]`, e.g. `stub://90@30/320x240`.
/// Without `@FPS` the frame rate is unreported.
#[derive(Debug)]
pub struct SyntheticSource {
    info: SourceInfo,
    total: u64,
    produced: u64,
    closed: bool,
}

impl SyntheticSource {
    pub const SCHEME: &'static str = "stub://";

    pub fn new(count: u64, fps: Option<f64>, width: u32, height: u32) -> Self {
        Self {
            info: SourceInfo {
                path: format!("{}{}", Self::SCHEME, count),
                fps,
                frame_count: Some(count),
                width,
                height,
            },
            total: count,
            produced: 0,
            closed: false,
        }
    }

    /// Parse a `stub://` path
    pub fn parse(path: &str) -> Result<Self, CameraError> {
        let rest = path
            .strip_prefix(Self::SCHEME)
            .ok_or_else(|| CameraError::unavailable(path, "not a stub:// path"))?;

        let (timing, size) = match rest.split_once('/') {
            Some((timing, size)) => (timing, Some(size)),
            None => (rest, None),
        };
        let (count, fps) = match timing.split_once('@') {
            Some((count, fps)) => (count, Some(fps)),
            None => (timing, None),
        };

        let count: u64 = count
            .parse()
            .map_err(|_| CameraError::unavailable(path, format!("bad frame count '{count}'")))?;
        let fps = fps
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|_| CameraError::unavailable(path, format!("bad frame rate '{f}'")))
            })
            .transpose()?;
        let (width, height) = match size {
            Some(size) => parse_size(size)
                .ok_or_else(|| CameraError::unavailable(path, format!("bad frame size '{size}'")))?,
            None => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        };

        let mut source = Self::new(count, fps, width, height);
        source.info.path = path.to_string();
        Ok(source)
    }

    /// Pixels of frame `sequence`
    pub fn render(sequence: u64, width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(frame_len(width, height));
        for y in 0..height {
            for x in 0..width {
                data.push((x as u64 + sequence) as u8);
                data.push(y as u8);
                data.push((sequence * 7) as u8);
            }
        }
        data
    }
}

/// Bytes in one RGB24 frame
fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.split_once('x')?;
    let (w, h) = (w.parse().ok()?, h.parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

impl VideoSource for SyntheticSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.closed || self.produced >= self.total {
            return Ok(None);
        }

        let sequence = self.produced;
        self.produced += 1;
        let data = Self::render(sequence, self.info.width, self.info.height);
        VideoFrame::new(
            data,
            self.info.width,
            self.info.height,
            timestamp_for(sequence, self.info.fps),
            sequence,
        )
        .map(Some)
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing synthetic source {}", self.info.path);
            self.closed = true;
        }
    }
}
