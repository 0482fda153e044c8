//! Per-frame detection and annotation

use camera_capture::VideoFrame;
use tracing::{debug, trace};

use crate::annotate::Annotator;
use crate::backend::{DetectorSlot, ModelConfig};
use crate::detection::Detection;
use crate::letterbox::Letterbox;
use crate::DetectionError;

/// Check detection parameters before any frame is touched
pub fn validate_parameters(
    confidence_threshold: f32,
    inference_size: u32,
) -> Result<(), DetectionError> {
    if !(0.0..=1.0).contains(&confidence_threshold) {
        return Err(DetectionError::InvalidParameter(format!(
            "confidence threshold {confidence_threshold} outside [0, 1]"
        )));
    }
    if inference_size == 0 {
        return Err(DetectionError::InvalidParameter(
            "inference size must be positive".into(),
        ));
    }
    Ok(())
}

/// Detects road objects on frames and draws them
pub struct FrameDetector {
    slot: DetectorSlot,
    annotator: Annotator,
}

impl FrameDetector {
    pub fn new(slot: DetectorSlot, annotator: Annotator) -> Self {
        Self { slot, annotator }
    }

    /// Current model configuration
    pub fn model_config(&self) -> &ModelConfig {
        self.slot.config()
    }

    /// Load the model now instead of on the first frame
    pub fn preload(&mut self) -> Result<(), DetectionError> {
        self.slot.get().map(|_| ())
    }

    /// Switch models; the loaded instance is dropped first
    pub fn reconfigure(&mut self, config: ModelConfig) {
        self.slot.reconfigure(config);
    }

    /// Run detection on `frame`.
    ///
    /// Returns an annotated copy and the detections in detector order, with
    /// boxes in `frame` pixel coordinates. `frame` itself is left untouched.
    /// Backend and model failures surface as [`DetectionError::Unavailable`].
    pub fn detect(
        &mut self,
        frame: &VideoFrame,
        confidence_threshold: f32,
        inference_size: u32,
    ) -> Result<(VideoFrame, Vec<Detection>), DetectionError> {
        validate_parameters(confidence_threshold, inference_size)?;

        if self.slot.config().inference_size != inference_size {
            let config = ModelConfig {
                inference_size,
                ..self.slot.config().clone()
            };
            self.slot.reconfigure(config);
        }

        let mut image = frame.to_image().map_err(|_| DetectionError::InvalidFrame)?;
        let letterbox = Letterbox::new(frame.width, frame.height, inference_size);
        let input = letterbox.apply(&image);

        let backend = self.slot.get().map_err(DetectionError::into_unavailable)?;
        let raw = backend
            .infer(&input, confidence_threshold)
            .map_err(DetectionError::into_unavailable)?;
        let names = backend.class_names();

        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|r| r.confidence >= confidence_threshold)
            .filter_map(|r| {
                let Some(bbox) = letterbox.to_source(&r.bbox) else {
                    trace!("Dropping box outside frame: {:?}", r.bbox);
                    return None;
                };
                Some(Detection::new(names.label(r.class_id), r.confidence.min(1.0), bbox))
            })
            .collect();

        debug!("Frame {}: {} detections", frame.sequence, detections.len());

        self.annotator.annotate(&mut image, &detections);
        Ok((frame.with_image(image), detections))
    }
}
