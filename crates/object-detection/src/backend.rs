//! Detector backend capability and model lifecycle

use image::RgbImage;
use std::path::PathBuf;
use tracing::info;

use crate::detection::{ClassNames, RawDetection};
use crate::DetectionError;

/// Object detection model.
///
/// `infer` receives a letterboxed square image of the configured inference
/// size and reports boxes in that image's coordinates, in the order the model
/// produced them.
pub trait DetectorBackend: Send {
    /// Backend identifier
    fn name(&self) -> &str;

    /// Class id → label mapping of the loaded model
    fn class_names(&self) -> &ClassNames;

    /// Run the model, keeping outputs with confidence ≥ `confidence`
    fn infer(
        &mut self,
        input: &RgbImage,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, DetectionError>;
}

/// Model identity; a change means the loaded instance must be replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Model weights
    pub model_path: PathBuf,
    /// Square input size the model runs at
    pub inference_size: u32,
}

/// Constructs backends for a model configuration
pub trait BackendLoader: Send {
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn DetectorBackend>, DetectionError>;
}

/// Owned, lazily loaded detector instance
pub struct DetectorSlot {
    loader: Box<dyn BackendLoader>,
    config: ModelConfig,
    backend: Option<Box<dyn DetectorBackend>>,
}

impl DetectorSlot {
    /// Slot for `config`; nothing is loaded until first use
    pub fn new(loader: Box<dyn BackendLoader>, config: ModelConfig) -> Self {
        Self {
            loader,
            config,
            backend: None,
        }
    }

    /// Current model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Whether a model instance is currently held
    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    /// Loaded backend, loading it on first use
    pub fn get(&mut self) -> Result<&mut Box<dyn DetectorBackend>, DetectionError> {
        let backend = match self.backend.take() {
            Some(backend) => backend,
            None => {
                let backend = self.loader.load(&self.config)?;
                info!(
                    "Loaded model from {} ({} backend, {}px)",
                    self.config.model_path.display(),
                    backend.name(),
                    self.config.inference_size
                );
                backend
            }
        };
        Ok(self.backend.insert(backend))
    }

    /// Switch to another model configuration.
    ///
    /// The previous instance is released before the next load.
    pub fn reconfigure(&mut self, config: ModelConfig) {
        if config == self.config {
            return;
        }
        if self.backend.take().is_some() {
            info!(
                "Releasing model {} for {}",
                self.config.model_path.display(),
                config.model_path.display()
            );
        }
        self.config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedBackend, ScriptedLoader};

    fn config(path: &str, size: u32) -> ModelConfig {
        ModelConfig {
            model_path: PathBuf::from(path),
            inference_size: size,
        }
    }

    #[test]
    fn test_loads_once_on_first_use() {
        let loader = ScriptedLoader::new(ScriptedBackend::new(ClassNames::bdd100k()));
        let mut slot = DetectorSlot::new(Box::new(loader.clone()), config("a.onnx", 640));
        assert!(!slot.is_loaded());
        assert_eq!(loader.loads(), 0);

        slot.get().unwrap();
        slot.get().unwrap();
        assert!(slot.is_loaded());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_reconfigure_replaces_instance() {
        let loader = ScriptedLoader::new(ScriptedBackend::new(ClassNames::bdd100k()));
        let mut slot = DetectorSlot::new(Box::new(loader.clone()), config("a.onnx", 640));
        slot.get().unwrap();
        assert_eq!(loader.live(), 1);

        slot.reconfigure(config("b.onnx", 640));
        assert_eq!(loader.live(), 0);
        slot.get().unwrap();

        assert_eq!(loader.loads(), 2);
        assert_eq!(loader.live(), 1);
        assert_eq!(loader.max_live_at_load(), 0);
        assert_eq!(slot.config().model_path, PathBuf::from("b.onnx"));
    }

    #[test]
    fn test_same_config_keeps_instance() {
        let loader = ScriptedLoader::new(ScriptedBackend::new(ClassNames::bdd100k()));
        let mut slot = DetectorSlot::new(Box::new(loader.clone()), config("a.onnx", 640));
        slot.get().unwrap();
        slot.reconfigure(config("a.onnx", 640));
        slot.get().unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_load_failure_is_retried_next_use() {
        let loader = ScriptedLoader::new(ScriptedBackend::new(ClassNames::bdd100k())).failing();
        let mut slot = DetectorSlot::new(Box::new(loader.clone()), config("bad.onnx", 640));
        assert!(matches!(slot.get(), Err(DetectionError::ModelLoad { .. })));
        assert!(slot.get().is_err());
        assert!(!slot.is_loaded());
    }
}
