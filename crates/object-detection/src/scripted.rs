//! Scripted detector backend for testing and dry runs (no model required)

use image::RgbImage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::backend::{BackendLoader, DetectorBackend, ModelConfig};
use crate::detection::{ClassNames, RawDetection};
use crate::DetectionError;

/// Backend returning pre-arranged outputs per call.
///
/// Call `n` (zero-based) returns the detections registered for `n`, or
/// fails if `n` was marked as failing. Unlisted calls detect nothing.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    class_names: ClassNames,
    outputs: HashMap<u64, Vec<RawDetection>>,
    failures: HashSet<u64>,
    calls: u64,
    live: Option<Arc<AtomicUsize>>,
}

impl ScriptedBackend {
    pub fn new(class_names: ClassNames) -> Self {
        Self {
            class_names,
            outputs: HashMap::new(),
            failures: HashSet::new(),
            calls: 0,
            live: None,
        }
    }

    /// Outputs for call `call`
    pub fn with_detections(mut self, call: u64, detections: Vec<RawDetection>) -> Self {
        self.outputs.insert(call, detections);
        self
    }

    /// Make call `call` fail
    pub fn failing_on(mut self, call: u64) -> Self {
        self.failures.insert(call);
        self
    }

    /// Calls made so far
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    fn infer(
        &mut self,
        _input: &RgbImage,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let call = self.calls;
        self.calls += 1;

        if self.failures.contains(&call) {
            debug!("Scripted backend failing call {}", call);
            return Err(DetectionError::Unavailable(format!("scripted failure on call {call}")));
        }

        Ok(self
            .outputs
            .get(&call)
            .map(|dets| dets.iter().filter(|d| d.confidence >= confidence).cloned().collect())
            .unwrap_or_default())
    }
}

impl Drop for ScriptedBackend {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Loader handing out copies of a scripted backend.
///
/// Clones share their counters.
#[derive(Debug, Clone)]
pub struct ScriptedLoader {
    template: ScriptedBackend,
    fail: bool,
    loads: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live_at_load: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(template: ScriptedBackend) -> Self {
        Self {
            template,
            fail: false,
            loads: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            max_live_at_load: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every load fails
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Successful loads so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Backends currently alive
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of instances alive at the moment of a load
    pub fn max_live_at_load(&self) -> usize {
        self.max_live_at_load.load(Ordering::SeqCst)
    }
}

impl BackendLoader for ScriptedLoader {
    fn load(&self, config: &ModelConfig) -> Result<Box<dyn DetectorBackend>, DetectionError> {
        if self.fail {
            return Err(DetectionError::ModelLoad {
                path: config.model_path.display().to_string(),
                reason: "scripted load failure".into(),
            });
        }

        self.max_live_at_load
            .fetch_max(self.live.load(Ordering::SeqCst), Ordering::SeqCst);
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);

        let mut backend = self.template.clone();
        backend.live = Some(self.live.clone());
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn raw(class_id: usize, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(1.0, 1.0, 5.0, 5.0),
        }
    }

    #[test]
    fn test_outputs_per_call() {
        let mut backend = ScriptedBackend::new(ClassNames::bdd100k())
            .with_detections(1, vec![raw(2, 0.9), raw(3, 0.1)])
            .failing_on(2);
        let input = RgbImage::new(8, 8);

        assert!(backend.infer(&input, 0.25).unwrap().is_empty());
        assert_eq!(backend.infer(&input, 0.25).unwrap(), vec![raw(2, 0.9)]);
        assert!(backend.infer(&input, 0.25).is_err());
        assert_eq!(backend.calls(), 3);
    }
}
