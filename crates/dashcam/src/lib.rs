//! Dashcam Frame Pipeline
//!
//! Turns recorded dashcam footage into a sampled, optionally annotated
//! frame sequence:
//! - Fixed-rate sampling of the source video
//! - Road object detection with box/label overlays
//! - JPEG frame output and per-frame detection logs
//! - Layered configuration (defaults, TOML file, environment, CLI)

pub mod config;
pub mod detection_log;
pub mod logging;
pub mod pipeline;
pub mod summary;
pub mod writer;

pub use config::{DashcamConfig, DetectionFailurePolicy};
pub use detection_log::{format_detection_line, DetectionLog};
pub use logging::init_logging;
pub use pipeline::{CancelToken, PipelineDriver, PipelineOptions, ProcessedFrame};
pub use summary::PipelineSummary;
pub use writer::{frame_file_name, FrameWriter, JpegWriter};

use camera_capture::CameraError;
use object_detection::DetectionError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    SourceUnavailable(#[from] CameraError),

    #[error("Invalid configuration: {field}: {reason}")]
    ConfigurationInvalid { field: String, reason: String },

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl PipelineError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        PipelineError::ConfigurationInvalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
