use clap::Parser;
use emotion_photo_booth::config::BoothConfig;
use emotion_photo_booth::emotion::ScriptedClassifier;
use emotion_photo_booth::error::{BoothError, Result};
use emotion_photo_booth::image_store::{DirectoryExporter, ImageDirSource, StillFrameSource};
use emotion_photo_booth::sequencer::FrameSource;
use emotion_photo_booth::{PhotoBooth, SessionOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Emotion photo booth: capture one frame per target expression, then build a collage
#[derive(Debug, Parser)]
#[command(name = "emotion-photo-booth", version)]
struct Args {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long, env = "BOOTH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines classifier script (one sample or `null` per tick)
    #[arg(short, long)]
    samples: PathBuf,

    /// Directory of png/jpg frames to replay as the video feed, or a single still image
    #[arg(short, long, required_unless_present = "camera")]
    frames: Option<PathBuf>,

    /// Use the webcam at this index instead of a frames directory
    #[arg(long)]
    camera: Option<u32>,

    /// Output directory, overriding `output.directory`
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Replay the sample script from the start when it runs out
    #[arg(long)]
    loop_samples: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "BOOTH_LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// Initializes logging: file only when a log file is given, stderr otherwise
fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let log_file = std::fs::File::create(path).map_err(BoothError::Io)?;
            let file_layer = fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

fn open_frames(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(index) = args.camera {
        return open_camera(index);
    }
    let dir = args
        .frames
        .as_ref()
        .ok_or_else(|| BoothError::Config("either --frames or --camera is required".into()))?;
    if dir.is_file() {
        return Ok(Box::new(StillFrameSource::load(dir)?));
    }
    Ok(Box::new(ImageDirSource::open(dir)?))
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(emotion_photo_booth::camera::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_index: u32) -> Result<Box<dyn FrameSource>> {
    Err(BoothError::Config(
        "this build has no camera support; rebuild with --features camera".into(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    let mut config = match &args.config {
        Some(path) => BoothConfig::load(path)?,
        None => BoothConfig::default(),
    };
    if let Some(out) = &args.out {
        config.output.directory = out.clone();
    }

    let frames = open_frames(&args)?;
    let classifier = ScriptedClassifier::load(&args.samples)?.looping(args.loop_samples);
    let exporter = DirectoryExporter::new(&config.output.directory)?;
    let booth = PhotoBooth::new(&config, frames, classifier, exporter)?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping session");
            ctrl_c_token.cancel();
        }
    });

    match booth.run(cancel).await {
        Ok(SessionOutcome::Completed {
            shots, exported_as, ..
        }) => {
            let labels: Vec<_> = shots.iter().map(|s| s.label.to_string()).collect();
            info!("Collage {} written with [{}]", exported_as, labels.join(", "));
            Ok(())
        }
        Ok(SessionOutcome::Cancelled { shots_taken, .. }) => {
            info!("Session cancelled with {} shots taken", shots_taken);
            Ok(())
        }
        Err(e) => {
            error!("Booth session failed: {}", e);
            Err(e)
        }
    }
}
