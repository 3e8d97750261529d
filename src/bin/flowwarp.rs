use std::{
    io::BufRead as _,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowwarp::{
    BoundsPolicy, Delivery, Effect, EffectConfig, EffectHandle, FfmpegEncoder, FfmpegFrameSource,
    FfmpegInput, Fps, FrameSequence, FrameSize, LatestFrameSink, PngSequenceSink, PreviewFileSink,
    PyramidLucasKanade, Tee, Unpaced,
};

#[derive(Parser, Debug)]
#[command(name = "flowwarp", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Smear an image with the motion of a video file and encode the result as MP4.
    Transfer(TransferArgs),
    /// Smear an image with a live camera or looping video, previewed as a PNG file.
    Live(LiveArgs),
    /// Apply a single iteration between two still frames and write the result as PNG.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct EffectArgs {
    /// Effect configuration JSON. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Working size (square side in pixels).
    #[arg(long)]
    size: Option<u32>,

    /// What happens to pixels pushed past the edge.
    #[arg(long, value_enum)]
    bounds: Option<BoundsChoice>,
}

#[derive(Parser, Debug)]
struct TransferArgs {
    /// Input video (anything ffmpeg decodes).
    video: PathBuf,

    /// Still image to smear.
    image: PathBuf,

    /// Output MP4 path.
    out: PathBuf,

    /// Also write every frame as a numbered PNG into this folder.
    #[arg(long)]
    frame_folder: Option<PathBuf>,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Parser, Debug)]
struct LiveArgs {
    /// Capture device or video to read. Files are looped.
    #[arg(long, default_value = "/dev/video0")]
    input: String,

    /// ffmpeg input format for capture devices (e.g. v4l2, avfoundation, dshow).
    #[arg(long)]
    format: Option<String>,

    /// Still image to smear.
    #[arg(long, conflicts_with = "random_image")]
    image: Option<PathBuf>,

    /// Start from a generated image instead of a file.
    #[arg(long)]
    random_image: bool,

    /// File overwritten with the current image on every frame.
    #[arg(long, default_value = "preview.png")]
    preview: PathBuf,

    /// Folder for snapshots saved with `s`.
    #[arg(long, default_value = ".")]
    snapshot_dir: PathBuf,

    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Earlier video frame (any image format).
    reference: PathBuf,

    /// Later video frame.
    current: PathBuf,

    /// Still image to smear.
    image: PathBuf,

    /// Output PNG path.
    out: PathBuf,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BoundsChoice {
    Drop,
    Clamp,
    Wrap,
}

impl From<BoundsChoice> for BoundsPolicy {
    fn from(c: BoundsChoice) -> Self {
        match c {
            BoundsChoice::Drop => Self::Drop,
            BoundsChoice::Clamp => Self::Clamp,
            BoundsChoice::Wrap => Self::Wrap,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Transfer(args) => cmd_transfer(args),
        Command::Live(args) => cmd_live(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn effect_config(args: &EffectArgs) -> anyhow::Result<EffectConfig> {
    let mut cfg = match &args.config {
        Some(path) => EffectConfig::from_json_path(path)?,
        None => EffectConfig::default(),
    };
    if let Some(side) = args.size {
        cfg.size = FrameSize::square(side);
    }
    if let Some(bounds) = args.bounds {
        cfg.bounds = bounds.into();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_transfer(args: TransferArgs) -> anyhow::Result<()> {
    let mut cfg = effect_config(&args.effect)?;

    let info = flowwarp::probe_video(&args.video)
        .with_context(|| format!("probe video '{}'", args.video.display()))?;
    if let Some(fps) = info.fps() {
        cfg.fps = fps;
    }
    info!(
        video = %args.video.display(),
        source = %format!("{}x{}", info.width, info.height),
        fps = cfg.fps.as_f64(),
        frames = ?info.frame_count,
        "transfer"
    );

    let still = flowwarp::load_still_image(&args.image, cfg.size)?;
    let source = FfmpegFrameSource::spawn(
        &FfmpegInput::File {
            location: args.video.to_string_lossy().into_owned(),
            looping: false,
        },
        cfg.size,
        Delivery::Sequential,
        cfg.stall_timeout(),
    )?;
    let encoder = FfmpegEncoder::new(flowwarp::default_mp4_config(&args.out, cfg.size, cfg.fps))?;
    let frames = args
        .frame_folder
        .as_ref()
        .map(|dir| PngSequenceSink::create(dir, 0))
        .transpose()?;

    let mut effect = Effect::start(
        source,
        PyramidLucasKanade::new(),
        Tee {
            first: encoder,
            second: frames,
        },
        still,
        cfg,
    )?;

    let stop = effect.stop_signal();
    ctrlc::set_handler(move || stop.stop()).context("install Ctrl-C handler")?;

    let mut ticker = Unpaced::new(effect.stop_signal());
    let result = effect.run(&mut ticker);
    let iterations = effect.iterations();
    let sink = effect.into_sink();
    match result {
        Ok(summary) => info!(iterations, stopped_by = ?summary.stopped_by, "transfer interrupted"),
        Err(e) if e.is_source_unavailable() => info!(iterations, "end of input: {e}"),
        Err(e) => return Err(e.into()),
    }

    sink.first.finish()?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_live(args: LiveArgs) -> anyhow::Result<()> {
    let mut cfg = effect_config(&args.effect)?;
    if let Some(fps) = args.fps {
        cfg.fps = Fps::new(fps, 1)?;
    }

    let still = match &args.image {
        Some(path) => flowwarp::load_still_image(path, cfg.size)?,
        None if args.random_image => {
            let seed: u64 = rand::random();
            info!(seed, "generated still image");
            flowwarp::random_still_image(cfg.size, seed)?
        }
        None => anyhow::bail!("pass --image <PATH> or --random-image"),
    };

    let input = match &args.format {
        Some(format) => FfmpegInput::Device {
            format: format.clone(),
            name: args.input.clone(),
        },
        None => FfmpegInput::File {
            location: args.input.clone(),
            looping: true,
        },
    };
    let source = FfmpegFrameSource::spawn(&input, cfg.size, Delivery::Latest, cfg.stall_timeout())?;
    let fps = cfg.fps;

    let mut effect = Effect::start(
        source,
        PyramidLucasKanade::new(),
        PreviewFileSink::new(&args.preview),
        still,
        cfg,
    )?;

    let handle = effect.handle();
    let ctrl = handle.clone();
    ctrlc::set_handler(move || ctrl.stop()).context("install Ctrl-C handler")?;
    spawn_command_reader(handle, args.snapshot_dir.clone());

    eprintln!(
        "previewing into {} (r = reset, s = save, q = quit)",
        args.preview.display()
    );
    let mut ticker = flowwarp::FrameClock::new(fps, effect.stop_signal());
    let summary = effect.run(&mut ticker)?;
    info!(iterations = summary.iterations, "live session ended");
    Ok(())
}

/// Reads one-letter commands from stdin on a background thread.
fn spawn_command_reader(handle: EffectHandle, snapshot_dir: PathBuf) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match line.trim() {
                "r" => {
                    handle.reset();
                }
                "s" => {
                    if let Err(e) = save_snapshot(&handle, &snapshot_dir) {
                        warn!("snapshot failed: {e:#}");
                    }
                }
                "q" => {
                    handle.stop();
                    break;
                }
                "" => {}
                other => warn!("unknown command '{other}' (r, s, q)"),
            }
        }
    });
}

fn save_snapshot(handle: &EffectHandle, dir: &Path) -> anyhow::Result<()> {
    let rx = handle
        .request_snapshot()
        .context("effect is no longer running")?;
    let buffer = rx.recv().context("effect stopped before the snapshot was taken")?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before 1970")?
        .as_millis();
    let path = dir.join(format!("{millis}.png"));
    flowwarp::save_png(&path, &buffer)?;
    eprintln!("saved {}", path.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = effect_config(&args.effect)?;
    let size = cfg.size;

    let load_gray = |path: &Path| -> anyhow::Result<flowwarp::GrayFrame> {
        let rgba = flowwarp::load_still_image(path, size)?;
        Ok(flowwarp::color::gray_from_pixels(&rgba)?)
    };
    let reference = load_gray(&args.reference)?;
    let current = load_gray(&args.current)?;
    let still = flowwarp::load_still_image(&args.image, size)?;

    let source = FrameSequence::new(size, [reference, current])?;
    let mut effect = Effect::start(
        source,
        PyramidLucasKanade::new(),
        LatestFrameSink::new(),
        still,
        cfg,
    )?;
    effect.step()?;

    flowwarp::save_png(&args.out, effect.buffer())?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
