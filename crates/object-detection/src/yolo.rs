//! YOLOv8 ONNX backend on tract
//!
//! Runs exported Ultralytics detection models (`[1, 4 + C, N]` outputs, boxes
//! as centre/size in input pixels, no objectness column) and applies
//! class-wise non-maximum suppression.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::backend::{BackendLoader, DetectorBackend, ModelConfig};
use crate::detection::{BoundingBox, ClassNames, RawDetection};
use crate::DetectionError;

/// IoU above which a weaker same-class box is suppressed
pub const NMS_IOU_THRESHOLD: f32 = 0.7;

/// Upper bound on detections per frame
pub const MAX_DETECTIONS: usize = 300;

type YoloModel = TypedRunnableModel<TypedModel>;

/// tract-backed YOLOv8 detector
pub struct TractYoloBackend {
    model: YoloModel,
    size: u32,
    class_names: ClassNames,
    path: PathBuf,
}

impl TractYoloBackend {
    /// Load and optimize a model for a fixed square input size
    pub fn load(
        model_path: &Path,
        size: u32,
        class_names: ClassNames,
    ) -> Result<Self, DetectionError> {
        let load_error = |e: TractError| DetectionError::ModelLoad {
            path: model_path.display().to_string(),
            reason: e.to_string(),
        };

        if !model_path.is_file() {
            return Err(DetectionError::ModelLoad {
                path: model_path.display().to_string(),
                reason: "model file not found".into(),
            });
        }

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(load_error)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, size as usize, size as usize),
                ),
            )
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!("YOLO model ready: {} ({} classes)", model_path.display(), class_names.len());

        Ok(Self {
            model,
            size,
            class_names,
            path: model_path.to_path_buf(),
        })
    }

    fn build_input(&self, image: &RgbImage) -> Result<Tensor, DetectionError> {
        if image.dimensions() != (self.size, self.size) {
            return Err(DetectionError::InvalidFrame);
        }

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.size as usize, self.size as usize),
            |(_, channel, y, x)| image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractYoloBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    fn infer(
        &mut self,
        input: &RgbImage,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| DetectionError::Unavailable(format!("inference failed: {e}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| DetectionError::Unavailable("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectionError::Unavailable(format!("unexpected output tensor: {e}")))?;
        let data: Vec<f32> = view.iter().copied().collect();

        let candidates =
            decode_predictions(&data, view.shape(), self.class_names.len(), confidence)?;
        let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD, MAX_DETECTIONS);
        debug!("{}: {} detections", self.path.display(), kept.len());
        Ok(kept)
    }
}

/// Loads [`TractYoloBackend`]s with a fixed label set
#[derive(Debug, Clone)]
pub struct TractLoader {
    class_names: ClassNames,
}

impl TractLoader {
    pub fn new(class_names: ClassNames) -> Self {
        Self { class_names }
    }
}

impl BackendLoader for TractLoader {
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn DetectorBackend>, DetectionError> {
        let backend = TractYoloBackend::load(
            &config.model_path,
            config.inference_size,
            self.class_names.clone(),
        )?;
        Ok(Box::new(backend))
    }
}

/// Decode a raw YOLOv8 output into candidate boxes.
///
/// Accepts `[1, 4 + C, N]` (exported default) and the transposed
/// `[1, N, 4 + C]`. When `num_classes` is known it decides the layout,
/// otherwise the shorter axis is taken as the attribute axis.
pub fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    num_classes: usize,
    confidence: f32,
) -> Result<Vec<RawDetection>, DetectionError> {
    let (a, b) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => {
            return Err(DetectionError::Unavailable(format!(
                "unsupported output shape {shape:?}"
            )))
        }
    };
    if data.len() != a * b {
        return Err(DetectionError::Unavailable(format!(
            "output holds {} values, shape {shape:?} needs {}",
            data.len(),
            a * b
        )));
    }

    let attributes_first = if num_classes > 0 && a == num_classes + 4 {
        true
    } else if num_classes > 0 && b == num_classes + 4 {
        false
    } else {
        a <= b
    };
    let (attrs, anchors) = if attributes_first { (a, b) } else { (b, a) };
    if attrs < 5 {
        return Err(DetectionError::Unavailable(format!(
            "output shape {shape:?} has no class scores"
        )));
    }

    let at = |anchor: usize, attr: usize| {
        if attributes_first {
            data[attr * anchors + anchor]
        } else {
            data[anchor * attrs + attr]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..attrs)
            .map(|attr| (attr - 4, at(anchor, attr)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if !score.is_finite() || score < confidence {
            continue;
        }

        let bbox =
            BoundingBox::from_cxcywh(at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
        if bbox.is_valid() {
            detections.push(RawDetection {
                class_id,
                confidence: score.min(1.0),
                bbox,
            });
        }
    }
    Ok(detections)
}

/// Class-wise greedy NMS; output is sorted by descending confidence
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
