//! Run statistics

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::pipeline::ProcessedFrame;

/// Totals accumulated over one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    /// Frames written to the output directory
    pub frames_extracted: u64,
    /// Detections across all frames
    pub total_detections: u64,
    /// Detections per class label
    pub per_class: BTreeMap<String, u64>,
    /// Frames whose detection failed and were passed through
    pub detection_failures: u64,
    /// Source frames consumed, kept or not
    pub source_frames_read: u64,
    /// The run was interrupted before end of stream
    pub cancelled: bool,
}

impl PipelineSummary {
    /// Account for one written frame
    pub fn record(&mut self, frame: &ProcessedFrame) {
        self.frames_extracted += 1;
        self.total_detections += frame.detections.len() as u64;
        for detection in &frame.detections {
            *self.per_class.entry(detection.label.clone()).or_default() += 1;
        }
        if frame.detection_failed {
            self.detection_failures += 1;
        }
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames extracted, {} detections",
            self.frames_extracted, self.total_detections
        )?;
        if self.detection_failures > 0 {
            write!(f, ", {} detection failures", self.detection_failures)?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
