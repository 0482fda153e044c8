//! Detection logs
//!
//! `detections.log` holds one human-readable line per frame with detections;
//! `detections.jsonl` holds one JSON record per written frame.

use object_detection::Detection;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::pipeline::ProcessedFrame;
use crate::PipelineError;

pub const TEXT_LOG_NAME: &str = "detections.log";
pub const JSON_LOG_NAME: &str = "detections.jsonl";

/// `Frame 3: car(0.91), truck(0.47)`
pub fn format_detection_line(index: u64, detections: &[Detection]) -> String {
    let items: Vec<String> = detections.iter().map(ToString::to_string).collect();
    format!("Frame {}: {}", index, items.join(", "))
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    index: u64,
    source_offset: u64,
    timestamp_ms: u64,
    detection_failed: bool,
    detections: &'a [Detection],
}

struct LogFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogFile {
    fn create(path: PathBuf) -> Result<Self, PipelineError> {
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, line: &str) -> Result<(), PipelineError> {
        writeln!(self.writer, "{line}").map_err(|e| PipelineError::io(&self.path, e))
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.writer.flush().map_err(|e| PipelineError::io(&self.path, e))
    }
}

/// Per-run detection log pair
pub struct DetectionLog {
    text: LogFile,
    json: LogFile,
}

impl DetectionLog {
    /// Create (truncate) both logs inside `dir`
    pub fn create(dir: &Path) -> Result<Self, PipelineError> {
        Ok(Self {
            text: LogFile::create(dir.join(TEXT_LOG_NAME))?,
            json: LogFile::create(dir.join(JSON_LOG_NAME))?,
        })
    }

    /// Log a written frame. Returns the text line if one was emitted.
    pub fn record(&mut self, frame: &ProcessedFrame) -> Result<Option<String>, PipelineError> {
        let record = FrameRecord {
            index: frame.index,
            source_offset: frame.source_offset,
            timestamp_ms: frame.frame.timestamp_ms(),
            detection_failed: frame.detection_failed,
            detections: &frame.detections,
        };
        let json =
            serde_json::to_string(&record).map_err(|e| PipelineError::Encode(e.to_string()))?;
        self.json.write_line(&json)?;

        if frame.detections.is_empty() {
            return Ok(None);
        }
        let line = format_detection_line(frame.index, &frame.detections);
        self.text.write_line(&line)?;
        Ok(Some(line))
    }

    /// Flush both logs to disk
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.text.flush()?;
        self.json.flush()
    }
}
