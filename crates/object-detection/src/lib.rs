//! Road Object Detection
//!
//! Object detection on dashcam frames:
//! - Pluggable detector backends (YOLOv8 ONNX through tract)
//! - Letterboxing to the inference size and mapping boxes back
//! - Bounding box and label overlays
//! - Lazily loaded, replaceable model instances

pub mod annotate;
pub mod backend;
pub mod detection;
pub mod detector;
pub mod letterbox;
pub mod scripted;
pub mod yolo;

pub use annotate::Annotator;
pub use backend::{BackendLoader, DetectorBackend, DetectorSlot, ModelConfig};
pub use detection::{BoundingBox, ClassNames, Detection, RawDetection};
pub use detector::FrameDetector;
pub use letterbox::Letterbox;
pub use scripted::{ScriptedBackend, ScriptedLoader};
pub use yolo::{TractLoader, TractYoloBackend};

use thiserror::Error;

/// Detection error types
#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("Detector unavailable: {0}")]
    Unavailable(String),

    #[error("Model loading failed for {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Invalid detection parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid frame format")]
    InvalidFrame,
}

impl DetectionError {
    /// Collapse capability failures into `Unavailable`
    pub fn into_unavailable(self) -> Self {
        match self {
            DetectionError::Unavailable(_) => self,
            other => DetectionError::Unavailable(other.to_string()),
        }
    }
}
