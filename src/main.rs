use anyhow::{Context, Result};
use clap::Parser;
use motionlab::prompt::Prompter;
use motionlab::{analyze, DetectorKind, PipelineConfig, PipelineError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file or frame directory; asked interactively when omitted
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// Detector menu id: 1 MOG, 2 MOG2, 3 face cascade
    #[arg(short, long)]
    detector: Option<u32>,

    /// Morphological noise reduction (0/1)
    #[arg(long)]
    noise_reduction: Option<u8>,

    /// Save snapshots periodically (0/1)
    #[arg(long)]
    save_frames: Option<u8>,

    /// Haar cascade XML file
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Root folder for snapshots, defaults to the video's folder
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Wait for a key every N frames, 0 plays without pausing
    #[arg(long, default_value_t = 10)]
    pause_every: u32,

    /// Frame interval for periodic snapshots
    #[arg(long, default_value_t = 10)]
    save_every: u32,

    /// Delay between frames during playback, in milliseconds
    #[arg(long, default_value_t = 24)]
    delay_ms: u64,

    /// Opening kernel size in pixels
    #[arg(long, default_value_t = 6)]
    kernel_size: u32,

    /// Minimum region area in pixels
    #[arg(long, default_value_t = 100)]
    min_area: u32,

    /// Disable shadow labelling in the background model
    #[arg(long)]
    no_shadows: bool,

    /// Run without display or key handling
    #[arg(long)]
    headless: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match run(&args) {
        Err(err) if err.is_user_facing() => {
            tracing::error!("{}. Exiting.", err);
            Ok(())
        }
        other => other.context("Detection run failed"),
    }
}

fn run(args: &Args) -> motionlab::Result<()> {
    let mut config = build_config(args)?;
    config.validate()?;

    if args.headless {
        config.show_playback = false;
        return report(analyze(config, motionlab::output::NullDisplay)?);
    }

    #[cfg(feature = "opencv")]
    let display = motionlab::output::HighGuiDisplay::new();
    #[cfg(not(feature = "opencv"))]
    let display = motionlab::output::ConsoleDisplay::stdin();

    report(analyze(config, display)?)
}

fn report(summary: motionlab::RunSummary) -> motionlab::Result<()> {
    tracing::info!(
        "Processed {} frames, {} regions, {} snapshots",
        summary.frames_processed,
        summary.regions_drawn,
        summary.snapshots_saved
    );
    tracing::info!(
        "Correct: {}, Wrong: {}, Both: {}",
        summary.tally.correct,
        summary.tally.wrong,
        summary.tally.both
    );
    Ok(())
}

/// Merge command-line answers with interactive ones
///
/// The prompter holds stdin only for the duration of this call.
fn build_config(args: &Args) -> motionlab::Result<PipelineConfig> {
    let mut prompt = Prompter::stdio();

    let video = match &args.video {
        Some(path) => path.clone(),
        None => prompt.select_video()?,
    };
    let detector = match args.detector {
        Some(id) => DetectorKind::try_from(id)?,
        None => prompt.select_detector()?,
    };
    let noise_reduction = match args.noise_reduction {
        Some(answer) => flag(answer, "noise reduction")?,
        None if detector == DetectorKind::Mog2 => prompt.toggle("Noise reduction")?,
        None => false,
    };
    let save_frames = match args.save_frames {
        Some(answer) => flag(answer, "save frames")?,
        None => prompt.toggle("Save frames")?,
    };

    let mut config = PipelineConfig::new(video, detector);
    config.settings.noise_reduction = noise_reduction;
    config.settings.kernel_size = args.kernel_size;
    config.settings.min_area = args.min_area;
    config.settings.detect_shadows = !args.no_shadows;
    if let Some(cascade) = &args.cascade {
        config.settings.cascade_path = cascade.clone();
    }
    config.pause_every = (args.pause_every > 0).then_some(args.pause_every);
    config.save_every = args.save_every;
    config.playback_delay = Duration::from_millis(args.delay_ms);
    config.save_frames = save_frames;
    config.output_root = args.output_dir.clone();

    tracing::info!(
        "Video: {}, detector: {}, noise reduction: {}, save frames: {}",
        config.video.display(),
        detector.label(),
        noise_reduction,
        save_frames
    );
    Ok(config)
}

fn flag(answer: u8, label: &str) -> motionlab::Result<bool> {
    match answer {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(PipelineError::selection(format!(
            "{} is not a valid answer for {}",
            answer, label
        ))),
    }
}
