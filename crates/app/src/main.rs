use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use streamer_media::{ControllerConfig, PipelineController};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Plays a file or an http(s) stream headlessly and reports what the
/// pipeline delivers.
#[derive(Parser, Debug)]
#[command(name = "streamer-play")]
#[command(version)]
struct Args {
    /// File path, file:// URL or http(s) URL
    location: String,

    /// JSON controller configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Playback volume, 0.0 to 1.0
    #[arg(long)]
    volume: Option<f64>,

    /// Start position in seconds
    #[arg(long)]
    seek: Option<f64>,

    /// Save the last decoded frame here on exit (png, jpg, ...)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Stop after this many seconds even without end of stream
    #[arg(long, default_value = "30")]
    timeout: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };

    let controller = PipelineController::with_config(config)?;
    let (eos_tx, eos_rx) = mpsc::channel();
    let slot = controller.frame_slot();
    controller.set_on_title(|title| info!(%title, "title"));
    controller.set_on_pre_roll(move || {
        let (width, height) = slot.size();
        info!(width, height, "first frame");
    });
    controller.set_on_eos(move || {
        let _ = eos_tx.send(());
    });

    if args.location.contains("://") {
        controller.open(&args.location)?;
    } else {
        controller.open_path(Path::new(&args.location))?;
    }
    if let Some(volume) = args.volume {
        controller.set_volume(volume);
    }

    controller.play().context("failed to start playback")?;
    if let Some(secs) = args.seek {
        let target = Duration::try_from_secs_f64(secs).context("invalid seek position")?;
        if let Err(e) = controller.seek(target) {
            warn!(error = %e, "initial seek failed");
        }
    }
    if let Ok(duration) = controller.duration() {
        info!(?duration, "duration");
    }

    let timeout = Duration::try_from_secs_f64(args.timeout).context("invalid timeout")?;
    let deadline = Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            info!("timeout reached");
            break;
        }
        match eos_rx.recv_timeout(left.min(Duration::from_secs(1))) {
            Ok(()) => {
                info!("end of stream");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let slot = controller.frame_slot();
                info!(
                    position = ?controller.frame_position(),
                    frames = slot.serial(),
                    decode_failures = slot.decode_failures(),
                    "playing"
                );
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(path) = &args.snapshot {
        match controller.frame() {
            Some(frame) => {
                frame
                    .image
                    .save(path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), serial = frame.serial, "snapshot saved");
            }
            None => warn!("no frame to snapshot"),
        }
    }

    controller.close();
    Ok(())
}
