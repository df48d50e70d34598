// Lookout Command Line Interface
// Replays precomputed detections over images and frame sequences

mod player;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use lookout_core::{MediaKind, OverlayConfig, Size};
use lookout_eye::{
    ChannelStatus, DetectionController, Detector, DetectorError, PassOutcome, RasterSurface,
    ReplayDetector, StatusMessage,
};
use player::FrameSequence;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lookout")]
#[command(about = "Lookout - draw object detections over images and video", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overlay configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect once on a still image
    Image {
        /// Image file (PNG or JPEG)
        file: PathBuf,

        /// Predictions JSON served by the replay detector
        #[arg(long, short)]
        predictions: PathBuf,

        /// Confidence threshold; unparseable text means 0
        #[arg(long, short)]
        threshold: Option<String>,

        /// Write the image with the overlay composed onto it
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Write the drawn overlay primitives as JSON
        #[arg(long)]
        overlay_json: Option<PathBuf>,

        /// Print the raw predictions of every applied batch
        #[arg(long)]
        explain: bool,
    },

    /// Play a directory of frames and detect on each displayed frame
    Video {
        /// Directory of PNG/JPEG frames, played in name order
        frames: PathBuf,

        /// Predictions JSON keyed by frame index
        #[arg(long, short)]
        predictions: PathBuf,

        /// Playback rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Confidence threshold; unparseable text means 0
        #[arg(long, short)]
        threshold: Option<String>,

        /// Rendered size as WIDTHxHEIGHT (defaults to the frame size)
        #[arg(long, value_parser = parse_size)]
        display: Option<Size>,

        /// Write every displayed frame with its overlay into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Image { file, predictions, threshold, out, overlay_json, explain } => {
            run_image(config, &file, &predictions, threshold.as_deref(), out, overlay_json, explain)
                .await?;
        }
        Commands::Video { frames, predictions, fps, threshold, display, out_dir } => {
            run_video(config, &frames, &predictions, fps, threshold.as_deref(), display, out_dir)
                .await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<OverlayConfig> {
    match path {
        Some(path) => {
            let config = OverlayConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(OverlayConfig::default()),
    }
}

fn parse_size(input: &str) -> Result<Size, String> {
    let (w, h) = input
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", input))?;
    let width = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let height = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if width == 0 || height == 0 {
        return Err("display size must be non-zero".to_string());
    }
    Ok(Size::new(width, height))
}

/// Print status lines in the order they were posted
fn spawn_printer(mut lines: UnboundedReceiver<StatusMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            println!("[{}] {}", line.at.format("%H:%M:%S%.3f"), line.text);
        }
    })
}

/// Build a controller over `surface` and load the replay detector into it.
async fn start_controller(
    config: OverlayConfig,
    surface: RasterSurface,
    status: ChannelStatus,
    predictions: &Path,
    threshold: Option<&str>,
) -> anyhow::Result<DetectionController> {
    let controller =
        DetectionController::builder(config, Box::new(surface), Arc::new(status)).build()?;
    if let Some(text) = threshold {
        let value = controller.threshold().set_from_str(text);
        debug!("Confidence threshold set to {}", value);
    }

    let path = predictions.to_path_buf();
    controller
        .load_detector(async move {
            let replay = ReplayDetector::from_file(&path)?;
            debug!("Replay detector holds {} frames", replay.frame_count());
            Ok::<_, DetectorError>(Arc::new(replay) as Arc<dyn Detector>)
        })
        .await?;
    Ok(controller)
}

async fn run_image(
    config: OverlayConfig,
    file: &Path,
    predictions: &Path,
    threshold: Option<&str>,
    out: Option<PathBuf>,
    overlay_json: Option<PathBuf>,
    explain: bool,
) -> anyhow::Result<()> {
    let raster = RasterSurface::default();
    let (status, lines) = ChannelStatus::new();
    let (status, mut batches) = status.with_explain();
    let printer = spawn_printer(lines);

    let controller =
        start_controller(config, raster.clone(), status, predictions, threshold).await?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("not a file: {}", file.display()))?;
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let media = controller.replace_media(MediaKind::Image, &name, &bytes)?;

    let outcome = controller.detect_image().await?;
    debug!("Detection on {} finished: {:?}", name, outcome);

    if explain {
        while let Ok(batch) = batches.try_recv() {
            println!("{}", serde_json::to_string_pretty(&batch.predictions())?);
        }
    }

    if let Some(path) = overlay_json {
        let primitives = controller.overlay();
        std::fs::write(&path, serde_json::to_string_pretty(&primitives)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {} overlay primitives to {}", primitives.len(), path.display());
    }

    if let Some(path) = out {
        if matches!(outcome, PassOutcome::NotReady) {
            warn!("{} has no pixels, nothing to compose", media.name());
        } else {
            let base = image::open(file)
                .with_context(|| format!("decoding {}", file.display()))?
                .to_rgba8();
            raster
                .compose(&base)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
    }

    drop(controller);
    let _ = printer.await;
    Ok(())
}

async fn run_video(
    config: OverlayConfig,
    frames: &Path,
    predictions: &Path,
    fps: u32,
    threshold: Option<&str>,
    display: Option<Size>,
    out_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let sequence = Arc::new(FrameSequence::open(frames, display)?);
    info!("Playing {} frames at {} fps", sequence.frame_count(), fps);

    if let Some(dir) = &out_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let raster = RasterSurface::default();
    let (status, lines) = ChannelStatus::new();
    let printer = spawn_printer(lines);

    let controller =
        start_controller(config, raster.clone(), status, predictions, threshold).await?;
    controller.replace_element(sequence.clone());

    let result = player::play(&controller, &sequence, fps, |index| {
        let Some(dir) = &out_dir else {
            return Ok(());
        };
        let Some(source) = sequence.frame_path(index) else {
            return Ok(());
        };
        let base = image::open(source)
            .with_context(|| format!("decoding {}", source.display()))?
            .to_rgba8();
        let target = dir.join(format!("frame_{:05}.png", index));
        raster
            .compose(&base)
            .save(&target)
            .with_context(|| format!("writing {}", target.display()))?;
        Ok(())
    })
    .await;

    controller.shutdown().await;
    drop(controller);
    let _ = printer.await;
    result
}
