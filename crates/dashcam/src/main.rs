//! Dashcam - Main Entry Point

use anyhow::{anyhow, Context, Result};
use camera_capture::SourceOptions;
use clap::{Args, Parser, Subcommand};
use dashcam::{
    init_logging, CancelToken, DashcamConfig, JpegWriter, PipelineDriver, PipelineOptions,
};
use device_status::{ConnectionSupervisor, SimulatedLink, Status, SupervisorConfig};
use object_detection::{
    Annotator, ClassNames, DetectorSlot, FrameDetector, ModelConfig, TractLoader,
};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dashcam", author, version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract sampled, annotated frames from a video
    Extract(ExtractArgs),
    /// Connect to a simulated device and show indicator colors
    Status(StatusArgs),
    /// Print the status to color table
    Colors,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Video file, image directory or stub://COUNT[@FPS][/WxH]
    #[arg(short, long)]
    input: Option<String>,

    /// ONNX detection model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frames kept per second of video
    #[arg(long)]
    fps: Option<f64>,

    /// Detector input size
    #[arg(long)]
    imgsz: Option<u32>,

    /// Minimum detection confidence
    #[arg(long)]
    conf: Option<f32>,

    /// Write frames without running detection
    #[arg(long)]
    no_detection: bool,

    /// Frame rate of sources that do not report one
    #[arg(long)]
    source_fps: Option<f64>,

    /// Class names file, one label per line
    #[arg(long)]
    names: Option<PathBuf>,

    /// Label font (TrueType)
    #[arg(long)]
    font: Option<PathBuf>,
}

impl ExtractArgs {
    fn apply(self, config: &mut DashcamConfig) {
        if let Some(input) = self.input {
            config.input = Some(input);
        }
        if let Some(model) = self.model {
            config.model_path = Some(model);
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(fps) = self.fps {
            config.target_fps = fps;
        }
        if let Some(imgsz) = self.imgsz {
            config.inference_size = imgsz;
        }
        if let Some(conf) = self.conf {
            config.confidence_threshold = conf;
        }
        if self.no_detection {
            config.run_detection = false;
        }
        if self.source_fps.is_some() {
            config.source_fps = self.source_fps;
        }
        if self.names.is_some() {
            config.class_names_path = self.names;
        }
        if self.font.is_some() {
            config.label_font_path = self.font;
        }
    }
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Connection attempts before giving up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Simulated attempts that fail before the device answers
    #[arg(long, default_value_t = 0)]
    fail_first: u32,

    /// Processing iterations once connected
    #[arg(long, default_value_t = 3)]
    iterations: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DashcamConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Extract(args) => extract(config, args),
        Command::Status(args) => status(config.supervisor, args),
        Command::Colors => {
            for status in Status::ALL {
                println!("{:<10} {}", status, status.color());
            }
            Ok(())
        }
    }
}

fn extract(mut config: DashcamConfig, args: ExtractArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let input = config
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input given (use --input or `input` in the config file)"))?;

    info!("=== Dashcam v{} ===", env!("CARGO_PKG_VERSION"));

    let detector = if config.run_detection {
        Some(build_detector(&config)?)
    } else {
        None
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the current frame");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let mut driver = PipelineDriver::with_writer(
        PipelineOptions::from(&config),
        detector,
        JpegWriter::new(config.jpeg_quality),
    )
    .with_source_options(SourceOptions {
        fallback_fps: config.source_fps,
    })
    .with_cancel_token(cancel);

    let summary = driver.run(&input)?;

    println!("Frames extracted: {}", summary.frames_extracted);
    if config.run_detection {
        println!("Total detections: {}", summary.total_detections);
        for (label, count) in &summary.per_class {
            println!("  {label}: {count}");
        }
        if summary.detection_failures > 0 {
            println!("Frames without detection (detector failed): {}", summary.detection_failures);
        }
    }
    if summary.cancelled {
        println!("Run interrupted; frames written so far are complete");
    }
    Ok(())
}

fn build_detector(config: &DashcamConfig) -> Result<FrameDetector> {
    let model_path = config
        .model_path
        .clone()
        .ok_or_else(|| anyhow!("model_path is required when detection is enabled"))?;

    let class_names = match &config.class_names_path {
        Some(path) => ClassNames::from_file(path)?,
        None => ClassNames::bdd100k(),
    };

    let slot = DetectorSlot::new(
        Box::new(TractLoader::new(class_names)),
        ModelConfig {
            model_path,
            inference_size: config.inference_size,
        },
    );
    Ok(FrameDetector::new(slot, Annotator::new(config.label_font_path.as_deref())))
}

fn status(mut supervisor_config: SupervisorConfig, args: StatusArgs) -> Result<()> {
    if let Some(max_retries) = args.max_retries {
        supervisor_config.max_retries = max_retries;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run_supervisor(supervisor_config, args.fail_first, args.iterations))
}

async fn run_supervisor(config: SupervisorConfig, fail_first: u32, iterations: u64) -> Result<()> {
    let max_retries = config.max_retries;
    let mut supervisor = ConnectionSupervisor::new(SimulatedLink::new(fail_first), config);

    let mut handle = supervisor.indicator().subscribe();
    println!("{:<10} {}", handle.current_status(), handle.color(None));
    let watcher = tokio::spawn(async move {
        while let Some(status) = handle.changed().await {
            println!("{:<10} {}", status, status.color());
        }
    });

    let mut remaining = iterations;
    let result = supervisor
        .run(max_retries, |_| {
            remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await;

    drop(supervisor);
    let _ = watcher.await;

    let outcome = result?;
    info!("Supervisor finished: {:?}", outcome);
    Ok(())
}
