//! Dashcam configuration
//!
//! Built-in defaults, then an optional TOML file, then `DASHCAM__*`
//! environment variables (`DASHCAM__SUPERVISOR__MAX_RETRIES=3`), then CLI
//! flags applied by the binary.

use ::config::{Config, Environment, File};
use device_status::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::PipelineError;

/// What to do with a frame whose detection failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFailurePolicy {
    /// Write the frame unannotated with no detections and carry on
    #[default]
    PassThrough,
    /// Stop the run
    Abort,
}

/// Dashcam configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashcamConfig {
    /// Video file, image directory or `stub://` source
    pub input: Option<String>,

    /// ONNX detection model
    pub model_path: Option<PathBuf>,

    /// Where frames and logs are written
    pub output_dir: PathBuf,

    /// Frames kept per second of video
    pub target_fps: f64,

    /// Square input size of the detector
    pub inference_size: u32,

    /// Minimum detection confidence (0-1)
    pub confidence_threshold: f32,

    /// Run detection and draw overlays
    pub run_detection: bool,

    /// Frame rate assumed for sources that do not report one
    pub source_fps: Option<f64>,

    /// Class labels, one per line (BDD100K classes when unset)
    pub class_names_path: Option<PathBuf>,

    /// TrueType font for labels
    pub label_font_path: Option<PathBuf>,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    pub failure_policy: DetectionFailurePolicy,

    pub supervisor: SupervisorConfig,
}

impl Default for DashcamConfig {
    fn default() -> Self {
        Self {
            input: None,
            model_path: None,
            output_dir: PathBuf::from("frames"),
            target_fps: 10.0,
            inference_size: 640,
            confidence_threshold: 0.25,
            run_detection: true,
            source_fps: None,
            class_names_path: None,
            label_font_path: None,
            jpeg_quality: 95,
            failure_policy: DetectionFailurePolicy::PassThrough,
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl DashcamConfig {
    /// Load defaults, `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("DASHCAM")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: DashcamConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::invalid(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        if self.inference_size == 0 {
            return Err(PipelineError::invalid("inference_size", "must be positive"));
        }
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return Err(PipelineError::invalid(
                "target_fps",
                format!("{} is not a positive frame rate", self.target_fps),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::invalid(
                "jpeg_quality",
                format!("{} is outside 1..=100", self.jpeg_quality),
            ));
        }
        if self.run_detection && self.model_path.is_none() {
            return Err(PipelineError::invalid(
                "model_path",
                "required when detection is enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that read `DASHCAM__*` variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn valid() -> DashcamConfig {
        DashcamConfig {
            model_path: Some(PathBuf::from("yolov8n.onnx")),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = DashcamConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("frames"));
        assert_eq!(config.target_fps, 10.0);
        assert_eq!(config.inference_size, 640);
        assert_eq!(config.confidence_threshold, 0.25);
        assert!(config.run_detection);
        assert_eq!(config.failure_policy, DetectionFailurePolicy::PassThrough);
        assert_eq!(config.supervisor.max_retries, 5);
    }

    #[test]
    fn test_load_toml_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashcam.toml");
        std::fs::write(
            &path,
            r#"
input = "drive.mp4"
model_path = "models/bdd100k.onnx"
target_fps = 5.0
confidence_threshold = 0.5
failure_policy = "abort"

[supervisor]
max_retries = 3
"#,
        )
        .unwrap();

        let config = DashcamConfig::load(Some(&path)).unwrap();
        assert_eq!(config.input.as_deref(), Some("drive.mp4"));
        assert_eq!(config.model_path, Some(PathBuf::from("models/bdd100k.onnx")));
        assert_eq!(config.target_fps, 5.0);
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.failure_policy, DetectionFailurePolicy::Abort);
        assert_eq!(config.supervisor.max_retries, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.inference_size, 640);
        assert_eq!(config.supervisor.attempt_timeout_ms, 2000);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let vars = [
            ("DASHCAM__SUPERVISOR__MAX_RETRIES", "3"),
            ("DASHCAM__TARGET_FPS", "5"),
            ("DASHCAM__RUN_DETECTION", "false"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let result = DashcamConfig::load(None);
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = result.unwrap();
        assert_eq!(config.supervisor.max_retries, 3);
        assert_eq!(config.target_fps, 5.0);
        assert!(!config.run_detection);
        assert_eq!(config.inference_size, 640);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DashcamConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let cases = [
            ("confidence_threshold", DashcamConfig { confidence_threshold: 1.2, ..valid() }),
            ("inference_size", DashcamConfig { inference_size: 0, ..valid() }),
            ("target_fps", DashcamConfig { target_fps: 0.0, ..valid() }),
            ("target_fps", DashcamConfig { target_fps: f64::NAN, ..valid() }),
            ("jpeg_quality", DashcamConfig { jpeg_quality: 0, ..valid() }),
            ("model_path", DashcamConfig { model_path: None, ..valid() }),
        ];
        for (expected, config) in cases {
            match config.validate() {
                Err(PipelineError::ConfigurationInvalid { field, .. }) => {
                    assert_eq!(field, expected)
                }
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_no_model_needed_without_detection() {
        let config = DashcamConfig {
            run_detection: false,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
