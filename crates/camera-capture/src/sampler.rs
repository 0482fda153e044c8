//! Fixed-rate frame sampling
//!
//! Keeps every `interval`-th source frame so that the output approximates a
//! target real-world rate regardless of the source frame rate.

use tracing::{debug, warn};

use crate::frame::VideoFrame;
use crate::source::{SourceInfo, VideoSource};
use crate::CameraError;

/// Number of source frames between two kept frames.
///
/// `max(1, floor(source_fps / target_fps))`; an unknown, zero or otherwise
/// unusable rate keeps every frame.
pub fn sample_interval(source_fps: Option<f64>, target_fps: f64) -> u64 {
    let Some(source_fps) = source_fps else {
        return 1;
    };
    if !source_fps.is_finite()
        || source_fps <= 0.0
        || !target_fps.is_finite()
        || target_fps <= 0.0
    {
        return 1;
    }
    ((source_fps / target_fps).floor() as u64).max(1)
}

/// A source frame selected for output
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Zero-based, gap-free position in the output sequence
    pub index: u64,
    /// Position of the frame in the source stream
    pub source_offset: u64,
    /// Decoded pixels
    pub frame: VideoFrame,
}

/// Lazily pulls frames from a source and yields the kept ones.
///
/// The source is closed when the sampler is dropped.
pub struct FrameSampler<S: VideoSource = Box<dyn VideoSource>> {
    source: S,
    interval: u64,
    source_counter: u64,
    next_index: u64,
    finished: bool,
}

impl<S: VideoSource> FrameSampler<S> {
    /// Sample `source` at `target_fps`
    pub fn new(source: S, target_fps: f64) -> Self {
        let interval = sample_interval(source.info().fps, target_fps);
        debug!(
            "Sampling {} every {} frame(s) (source {:?} fps, target {} fps)",
            source.info().path,
            interval,
            source.info().fps,
            target_fps
        );

        Self {
            source,
            interval,
            source_counter: 0,
            next_index: 0,
            finished: false,
        }
    }

    /// Frames between kept frames
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Source stream properties
    pub fn info(&self) -> &SourceInfo {
        self.source.info()
    }

    /// Source frames consumed so far
    pub fn frames_read(&self) -> u64 {
        self.source_counter
    }

    /// Frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_index
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.source.close();
        }
    }
}

impl<S: VideoSource> Iterator for FrameSampler<S> {
    type Item = Result<SampledFrame, CameraError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("End of stream after {} source frames", self.source_counter);
                    self.finish();
                    return None;
                }
                Err(e) => {
                    warn!(
                        "Read failed at source frame {}, ending stream: {}",
                        self.source_counter, e
                    );
                    self.finish();
                    return Some(Err(e));
                }
            };

            let offset = self.source_counter;
            self.source_counter += 1;

            if offset % self.interval == 0 {
                let index = self.next_index;
                self.next_index += 1;
                return Some(Ok(SampledFrame {
                    index,
                    source_offset: offset,
                    frame,
                }));
            }
        }

        None
    }
}

impl<S: VideoSource> Drop for FrameSampler<S> {
    fn drop(&mut self) {
        self.finish();
    }
}
