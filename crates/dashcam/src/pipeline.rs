//! Frame extraction pipeline
//!
//! Single-threaded: each sampled frame is detected, annotated and written
//! before the next one is read from the source.

use camera_capture::{
    open_source, FrameSampler, SampledFrame, SourceOptions, VideoFrame, VideoSource,
};
use object_detection::{Detection, FrameDetector};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DashcamConfig, DetectionFailurePolicy};
use crate::detection_log::DetectionLog;
use crate::summary::PipelineSummary;
use crate::writer::{frame_file_name, FrameWriter, JpegWriter};
use crate::PipelineError;

/// Stops a run between frames
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-run pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub target_fps: f64,
    pub run_detection: bool,
    pub confidence_threshold: f32,
    pub inference_size: u32,
    pub failure_policy: DetectionFailurePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&DashcamConfig::default())
    }
}

impl From<&DashcamConfig> for PipelineOptions {
    fn from(config: &DashcamConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            target_fps: config.target_fps,
            run_detection: config.run_detection,
            confidence_threshold: config.confidence_threshold,
            inference_size: config.inference_size,
            failure_policy: config.failure_policy,
        }
    }
}

impl PipelineOptions {
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
        Ok(())
    }
}

/// A sampled frame after detection, ready to be written
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Output sequence index
    pub index: u64,
    /// Position in the source stream
    pub source_offset: u64,
    /// Annotated frame, or the source pixels when passed through
    pub frame: VideoFrame,
    /// Detections in detector order
    pub detections: Vec<Detection>,
    /// Detection was attempted and failed
    pub detection_failed: bool,
}

impl ProcessedFrame {
    fn pass_through(sampled: SampledFrame, detection_failed: bool) -> Self {
        Self {
            index: sampled.index,
            source_offset: sampled.source_offset,
            frame: sampled.frame,
            detections: Vec::new(),
            detection_failed,
        }
    }
}

/// Drives sampling, detection and persistence over a whole video
pub struct PipelineDriver<W = JpegWriter> {
    options: PipelineOptions,
    detector: Option<FrameDetector>,
    writer: W,
    source_options: SourceOptions,
    cancel: CancelToken,
}

impl PipelineDriver<JpegWriter> {
    /// Driver writing JPEG frames at default quality
    pub fn new(options: PipelineOptions, detector: Option<FrameDetector>) -> Self {
        Self::with_writer(options, detector, JpegWriter::default())
    }
}

impl<W: FrameWriter> PipelineDriver<W> {
    pub fn with_writer(
        options: PipelineOptions,
        detector: Option<FrameDetector>,
        writer: W,
    ) -> Self {
        Self {
            options,
            detector,
            writer,
            source_options: SourceOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Options used when opening sources by path
    pub fn with_source_options(mut self, source_options: SourceOptions) -> Self {
        self.source_options = source_options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Open `path` and process it
    pub fn run(&mut self, path: &str) -> Result<PipelineSummary, PipelineError> {
        self.check_options()?;
        let source = open_source(path, &self.source_options)?;
        info!(
            "Opened {} ({}x{}, {:?} fps, {:?} frames)",
            path,
            source.info().width,
            source.info().height,
            source.info().fps,
            source.info().frame_count
        );
        self.run_source(source)
    }

    /// Process an already opened source.
    ///
    /// The source is closed before returning, on success and on every error.
    /// A model that cannot be loaded is reported as an invalid `model_path`
    /// before the output directory is created.
    pub fn run_source<S: VideoSource>(
        &mut self,
        source: S,
    ) -> Result<PipelineSummary, PipelineError> {
        // The sampler owns the source from here; dropping it closes the source.
        let mut sampler = FrameSampler::new(source, self.options.target_fps);
        self.check_options()?;
        self.preload_detector()?;

        let output_dir = self.options.output_dir.clone();
        fs::create_dir_all(&output_dir).map_err(|e| PipelineError::io(&output_dir, e))?;
        let mut log = DetectionLog::create(&output_dir)?;

        let mut summary = PipelineSummary::default();
        info!(
            "Extracting every {} frame(s) into {}",
            sampler.interval(),
            output_dir.display()
        );

        let result = self.process_stream(&mut sampler, &mut log, &mut summary);
        summary.source_frames_read = sampler.frames_read();
        drop(sampler);
        log.flush()?;
        result?;

        info!("Run finished: {}", summary);
        Ok(summary)
    }

    fn check_options(&self) -> Result<(), PipelineError> {
        self.options.validate()?;
        if self.options.run_detection && self.detector.is_none() {
            return Err(PipelineError::invalid(
                "model_path",
                "detection enabled without a detector",
            ));
        }
        Ok(())
    }

    fn preload_detector(&mut self) -> Result<(), PipelineError> {
        let detector = match self.detector.as_mut() {
            Some(detector) if self.options.run_detection => detector,
            _ => return Ok(()),
        };
        detector.preload().map_err(|e| {
            warn!("Detection model could not be loaded: {}", e);
            PipelineError::invalid("model_path", format!("model could not be loaded: {e}"))
        })
    }

    fn process_stream<S: VideoSource>(
        &mut self,
        sampler: &mut FrameSampler<S>,
        log: &mut DetectionLog,
        summary: &mut PipelineSummary,
    ) -> Result<(), PipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled after {} frames", summary.frames_extracted);
                summary.cancelled = true;
                return Ok(());
            }

            let sampled = match sampler.next() {
                Some(Ok(sampled)) => sampled,
                Some(Err(e)) => {
                    warn!("Stopping at unreadable source frame: {}", e);
                    return Ok(());
                }
                None => return Ok(()),
            };

            let processed = self.process_frame(sampled)?;
            let path = self.options.output_dir.join(frame_file_name(processed.index));
            self.writer.write(&path, &processed.frame)?;

            if let Some(line) = log.record(&processed)? {
                info!("{}", line);
            }
            summary.record(&processed);
            debug!("Wrote {}", path.display());
        }
    }

    /// Detect on one sampled frame, applying the failure policy
    pub fn process_frame(
        &mut self,
        sampled: SampledFrame,
    ) -> Result<ProcessedFrame, PipelineError> {
        let detector = match self.detector.as_mut() {
            Some(detector) if self.options.run_detection => detector,
            _ => return Ok(ProcessedFrame::pass_through(sampled, false)),
        };

        match detector.detect(
            &sampled.frame,
            self.options.confidence_threshold,
            self.options.inference_size,
        ) {
            Ok((annotated, detections)) => Ok(ProcessedFrame {
                index: sampled.index,
                source_offset: sampled.source_offset,
                frame: annotated,
                detections,
                detection_failed: false,
            }),
            Err(e) => match self.options.failure_policy {
                DetectionFailurePolicy::PassThrough => {
                    warn!("Detection failed on frame {}, passing through: {}", sampled.index, e);
                    Ok(ProcessedFrame::pass_through(sampled, true))
                }
                DetectionFailurePolicy::Abort => {
                    warn!("Detection failed on frame {}, aborting: {}", sampled.index, e);
                    Err(PipelineError::Detection(e))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_log::{JSON_LOG_NAME, TEXT_LOG_NAME};
    use camera_capture::{CameraError, SourceInfo, SyntheticSource};
    use object_detection::{
        Annotator, BoundingBox, ClassNames, DetectionError, DetectorSlot, ModelConfig, RawDetection,
        ScriptedBackend, ScriptedLoader,
    };
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// Counts `close` calls on the wrapped source
    struct CountingSource {
        inner: SyntheticSource,
        closes: Arc<AtomicUsize>,
    }

    impl CountingSource {
        fn new(count: u64) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let source = Self {
                inner: SyntheticSource::new(count, Some(10.0), 64, 64),
                closes: closes.clone(),
            };
            (source, closes)
        }
    }

    impl VideoSource for CountingSource {
        fn info(&self) -> &SourceInfo {
            self.inner.info()
        }

        fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            self.inner.read()
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
    }

    /// Keeps written frames in memory
    #[derive(Default)]
    struct RecordingWriter {
        frames: Vec<(PathBuf, VideoFrame)>,
    }

    impl FrameWriter for RecordingWriter {
        fn write(&mut self, path: &Path, frame: &VideoFrame) -> Result<(), PipelineError> {
            self.frames.push((path.to_path_buf(), frame.clone()));
            Ok(())
        }
    }

    /// Cancels the run after a number of frames
    struct CancellingWriter {
        cancel: CancelToken,
        after: usize,
        written: usize,
    }

    impl FrameWriter for CancellingWriter {
        fn write(&mut self, _path: &Path, _frame: &VideoFrame) -> Result<(), PipelineError> {
            self.written += 1;
            if self.written == self.after {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    fn options(output_dir: &Path, run_detection: bool) -> PipelineOptions {
        PipelineOptions {
            output_dir: output_dir.to_path_buf(),
            target_fps: 10.0,
            run_detection,
            confidence_threshold: 0.25,
            inference_size: 64,
            failure_policy: DetectionFailurePolicy::PassThrough,
        }
    }

    fn detector(backend: ScriptedBackend) -> FrameDetector {
        let slot = DetectorSlot::new(
            Box::new(ScriptedLoader::new(backend)),
            ModelConfig {
                model_path: PathBuf::from("bdd100k.onnx"),
                inference_size: 64,
            },
        );
        FrameDetector::new(slot, Annotator::without_font())
    }

    fn car_on_frame(call: u64) -> ScriptedBackend {
        ScriptedBackend::new(ClassNames::bdd100k()).with_detections(
            call,
            vec![RawDetection {
                class_id: 2,
                confidence: 0.91,
                bbox: BoundingBox::new(10.0, 10.0, 50.0, 50.0),
            }],
        )
    }

    fn unloadable_detector() -> FrameDetector {
        let slot = DetectorSlot::new(
            Box::new(ScriptedLoader::new(ScriptedBackend::new(ClassNames::bdd100k())).failing()),
            ModelConfig {
                model_path: PathBuf::from("missing.onnx"),
                inference_size: 64,
            },
        );
        FrameDetector::new(slot, Annotator::without_font())
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_end_to_end_three_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut driver = PipelineDriver::new(options(&out, true), Some(detector(car_on_frame(1))));

        let summary = driver.run("stub://3@10/64x64").unwrap();

        for name in ["frame_00000.jpg", "frame_00001.jpg", "frame_00002.jpg"] {
            assert!(out.join(name).is_file(), "{name} missing");
        }
        assert!(!out.join("frame_00003.jpg").exists());
        assert_eq!(read_lines(&out.join(TEXT_LOG_NAME)), ["Frame 1: car(0.91)"]);
        assert_eq!(read_lines(&out.join(JSON_LOG_NAME)).len(), 3);
        assert_eq!(summary.frames_extracted, 3);
        assert_eq!(summary.total_detections, 1);
        assert_eq!(summary.per_class["car"], 1);
        assert_eq!(summary.source_frames_read, 3);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_sampling_keeps_every_third_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), false);
        opts.target_fps = 10.0;
        let mut driver = PipelineDriver::with_writer(opts, None, RecordingWriter::default());

        let summary = driver.run_source(SyntheticSource::new(9, Some(30.0), 8, 8)).unwrap();

        let frames = &driver.writer().frames;
        let names: Vec<_> = frames
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_00000.jpg", "frame_00001.jpg", "frame_00002.jpg"]);
        let sequences: Vec<_> = frames.iter().map(|(_, f)| f.sequence).collect();
        assert_eq!(sequences, [0, 3, 6]);
        assert_eq!(summary.source_frames_read, 9);
    }

    #[test]
    fn test_pass_through_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = PipelineDriver::with_writer(
            options(dir.path(), false),
            None,
            RecordingWriter::default(),
        );

        let summary = driver.run_source(SyntheticSource::new(4, Some(10.0), 16, 12)).unwrap();

        assert_eq!(summary.frames_extracted, 4);
        assert_eq!(summary.total_detections, 0);
        for (i, (_, frame)) in driver.writer().frames.iter().enumerate() {
            assert_eq!(frame.data, SyntheticSource::render(i as u64, 16, 12));
        }
        assert!(read_lines(&dir.path().join(TEXT_LOG_NAME)).is_empty());
    }

    #[test]
    fn test_detection_failure_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let backend = car_on_frame(0).failing_on(2);
        let mut driver = PipelineDriver::with_writer(
            options(dir.path(), true),
            Some(detector(backend)),
            RecordingWriter::default(),
        );

        let summary = driver.run_source(SyntheticSource::new(5, Some(10.0), 64, 64)).unwrap();

        assert_eq!(summary.frames_extracted, 5);
        assert_eq!(summary.detection_failures, 1);
        assert_eq!(driver.writer().frames.len(), 5);
        let (_, failed) = &driver.writer().frames[2];
        assert_eq!(failed.data, SyntheticSource::render(2, 64, 64));

        let records = read_lines(&dir.path().join(JSON_LOG_NAME));
        let record: serde_json::Value = serde_json::from_str(&records[2]).unwrap();
        assert_eq!(record["detection_failed"], true);
        assert_eq!(record["detections"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_abort_policy_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), true);
        opts.failure_policy = DetectionFailurePolicy::Abort;
        let backend = ScriptedBackend::new(ClassNames::bdd100k()).failing_on(1);
        let mut driver =
            PipelineDriver::with_writer(opts, Some(detector(backend)), RecordingWriter::default());

        let result = driver.run_source(SyntheticSource::new(5, Some(10.0), 64, 64));

        assert!(matches!(
            result,
            Err(PipelineError::Detection(DetectionError::Unavailable(_)))
        ));
        assert_eq!(driver.writer().frames.len(), 1);
    }

    #[test]
    fn test_missing_source_creates_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut driver = PipelineDriver::new(options(&out, false), None);

        let result = driver.run(&dir.path().join("missing.mp4").to_string_lossy());

        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
        assert!(!out.exists());
    }

    #[test]
    fn test_invalid_options_fail_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut opts = options(&out, false);
        opts.confidence_threshold = 2.0;
        let mut driver = PipelineDriver::new(opts, None);

        let result = driver.run("stub://3@10");
        assert!(matches!(result, Err(PipelineError::ConfigurationInvalid { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_detection_without_detector_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut driver = PipelineDriver::new(options(&out, true), None);

        let result = driver.run("stub://3@10");
        assert!(matches!(
            result,
            Err(PipelineError::ConfigurationInvalid { ref field, .. }) if field == "model_path"
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_unloadable_model_is_invalid_model_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut driver = PipelineDriver::new(options(&out, true), Some(unloadable_detector()));

        let result = driver.run("stub://3@10/64x64");
        assert!(matches!(
            result,
            Err(PipelineError::ConfigurationInvalid { ref field, .. }) if field == "model_path"
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_source_closed_when_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut driver = PipelineDriver::new(options(&out, true), Some(unloadable_detector()));
        let (source, closes) = CountingSource::new(3);

        assert!(driver.run_source(source).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!out.exists());
    }

    #[test]
    fn test_source_closed_when_output_dir_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let mut driver = PipelineDriver::new(options(&blocker.join("frames"), false), None);
        let (source, closes) = CountingSource::new(3);

        let result = driver.run_source(source);
        assert!(matches!(result, Err(PipelineError::Io { .. })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_closed_when_options_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), false);
        opts.inference_size = 0;
        let mut driver = PipelineDriver::new(opts, None);
        let (source, closes) = CountingSource::new(3);

        assert!(driver.run_source(source).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_closed_once_after_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = PipelineDriver::with_writer(
            options(dir.path(), false),
            None,
            RecordingWriter::default(),
        );
        let (source, closes) = CountingSource::new(4);

        let summary = driver.run_source(source).unwrap();
        assert_eq!(summary.frames_extracted, 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_between_frames() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let writer = CancellingWriter {
            cancel: cancel.clone(),
            after: 2,
            written: 0,
        };
        let mut driver = PipelineDriver::with_writer(options(dir.path(), false), None, writer)
            .with_cancel_token(cancel);

        let summary = driver.run_source(SyntheticSource::new(10, Some(10.0), 8, 8)).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.frames_extracted, 2);
        assert_eq!(driver.writer().written, 2);
    }

    #[test]
    fn test_unknown_source_rate_keeps_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = PipelineDriver::with_writer(
            options(dir.path(), false),
            None,
            RecordingWriter::default(),
        );

        let summary = driver.run_source(SyntheticSource::new(4, None, 8, 8)).unwrap();
        assert_eq!(summary.frames_extracted, 4);
    }
}
