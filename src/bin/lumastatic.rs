use std::{
    io::{BufRead as _, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use lumastatic::{
    ContainerFormat, EffectConfig, EffectSession, FfmpegSource, LocalFile, LumaMode,
    LumastaticError, MissingAudioPolicy, NoiseDepth, ProgressObserver, ProgressUpdate,
    SourceAcquirer as _, YtDlp,
};

#[derive(Parser, Debug)]
#[command(name = "lumastatic", version)]
struct Cli {
    /// Hide the progress bar.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the effect to a video file (requires `ffmpeg`/`ffprobe` on PATH).
    Render(RenderArgs),
    /// Composite a single frame and write it as a grayscale PNG.
    Frame(FrameArgs),
    /// Print stream metadata as JSON.
    Probe(ProbeArgs),
    /// Acquire a source (local path or URL), confirm, then render it.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct EffectArgs {
    /// JSON effect config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Luminance threshold; brighter pixels get per-frame noise.
    #[arg(long)]
    threshold: Option<u8>,

    /// RGB to luminance conversion.
    #[arg(long, value_enum)]
    luma: Option<LumaChoice>,

    /// Noise sample alphabet.
    #[arg(long, value_enum)]
    noise: Option<DepthChoice>,

    /// Fixed noise seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Container of the intermediate visual-only file.
    #[arg(long, value_enum)]
    intermediate: Option<FormatChoice>,

    /// Container used when the output path is derived.
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// Fail instead of writing a silent output when the source has no audio.
    #[arg(long)]
    require_audio: bool,

    /// Decode, composite and encode on separate threads.
    #[arg(long)]
    overlap: bool,

    /// Composite rows in parallel.
    #[arg(long)]
    parallel: bool,

    /// Worker threads for `--parallel`.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output path. Defaults to `<input stem>_static.<format>` beside the input.
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Local video path or http(s) URL.
    selector: String,

    /// Name for the downloaded and rendered files. Asked for when a URL is given without it.
    #[arg(long)]
    name: Option<String>,

    /// Where downloads are stored.
    #[arg(long, default_value = "inputFiles")]
    download_dir: PathBuf,

    /// Where rendered videos are written.
    #[arg(long, default_value = "outputFiles")]
    out_dir: PathBuf,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,

    #[command(flatten)]
    effect: EffectArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Avi,
    Mkv,
    Mp4,
}

impl From<FormatChoice> for ContainerFormat {
    fn from(c: FormatChoice) -> Self {
        match c {
            FormatChoice::Avi => ContainerFormat::Avi,
            FormatChoice::Mkv => ContainerFormat::Mkv,
            FormatChoice::Mp4 => ContainerFormat::Mp4,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LumaChoice {
    Rec601,
    Average,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DepthChoice {
    Bits8,
    Bits1,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let quiet = cli.quiet;
    let res = match cli.cmd {
        Command::Render(args) => cmd_render(args, quiet),
        Command::Frame(args) => cmd_frame(args),
        Command::Probe(args) => cmd_probe(args),
        Command::Run(args) => cmd_run(args, quiet),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let stage = e
                .downcast_ref::<LumastaticError>()
                .map_or("cli", LumastaticError::stage);
            eprintln!("lumastatic: {stage} failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &EffectArgs) -> anyhow::Result<EffectConfig> {
    let mut cfg = match &args.config {
        Some(p) => EffectConfig::from_path(p)?,
        None => EffectConfig::default(),
    };
    if let Some(t) = args.threshold {
        cfg.luma_threshold = t;
    }
    if let Some(l) = args.luma {
        cfg.luma_mode = match l {
            LumaChoice::Rec601 => LumaMode::Rec601,
            LumaChoice::Average => LumaMode::Average,
        };
    }
    if let Some(n) = args.noise {
        cfg.noise_depth = match n {
            DepthChoice::Bits8 => NoiseDepth::Bits8,
            DepthChoice::Bits1 => NoiseDepth::Bits1,
        };
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    if let Some(f) = args.intermediate {
        cfg.intermediate_format = f.into();
    }
    if let Some(f) = args.format {
        cfg.output_format = f.into();
    }
    if args.require_audio {
        cfg.missing_audio = MissingAudioPolicy::Fail;
    }
    cfg.overlap_stages |= args.overlap;
    cfg.parallel_pixels |= args.parallel;
    if args.threads.is_some() {
        cfg.threads = args.threads;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_render(args: RenderArgs, quiet: bool) -> anyhow::Result<()> {
    let cfg = load_config(&args.effect)?;
    let out = match args.out {
        Some(p) => p,
        None => default_output(&args.in_path, cfg.output_format)?,
    };
    render(cfg, &args.in_path, &out, quiet)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.effect)?;
    let mut session = EffectSession::new(cfg)?;
    let mut source = FfmpegSource::open(&args.in_path)?;
    let frame = session.preview_frame(&mut source, args.index)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::L8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let info = lumastatic::probe_video(&args.in_path)?;
    let json = serde_json::to_string_pretty(&info).context("serialize probe info")?;
    println!("{json}");
    Ok(())
}

fn cmd_run(args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    let cfg = load_config(&args.effect)?;

    let (input, stem) = if lumastatic::acquire::is_url(&args.selector) {
        let stem = match args.name {
            Some(n) => n,
            None => prompt("name for the downloaded video: ")?,
        };
        let path = YtDlp::new(&args.download_dir, stem.clone()).acquire(&args.selector)?;
        (path, stem)
    } else {
        let path = LocalFile.acquire(&args.selector)?;
        let stem = match args.name {
            Some(n) => n,
            None => lumastatic::acquire::file_stem(&path)
                .with_context(|| format!("derive a name from '{}'", path.display()))?,
        };
        (path, stem)
    };

    if !args.yes {
        let answer = prompt("generate the static noise version? (yes/no): ")?;
        if !is_affirmative(&answer) {
            eprintln!("skipped");
            return Ok(());
        }
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;
    let out = args
        .out_dir
        .join(format!("{stem}.{}", cfg.output_format.extension()));
    render(cfg, &input, &out, quiet)
}

fn render(cfg: EffectConfig, input: &Path, out: &Path, quiet: bool) -> anyhow::Result<()> {
    let mut session = EffectSession::new(cfg)?;
    let mut progress = BarProgress::new(quiet);
    let report = session.render_file(input, out, &mut progress)?;
    if !report.has_audio {
        eprintln!("note: source has no audio; output is silent");
    }
    eprintln!(
        "wrote {} ({} frames)",
        report.output.display(),
        report.stats.frames_written
    );
    Ok(())
}

fn default_output(input: &Path, format: ContainerFormat) -> anyhow::Result<PathBuf> {
    let stem = lumastatic::acquire::file_stem(input)
        .with_context(|| format!("derive an output name from '{}'", input.display()))?;
    Ok(input.with_file_name(format!("{stem}_static.{}", format.extension())))
}

fn prompt(question: &str) -> anyhow::Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{question}").context("write prompt")?;
    stderr.flush().context("flush prompt")?;
    let mut line = String::new();
    let n = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read answer")?;
    if n == 0 {
        anyhow::bail!("no answer on stdin");
    }
    Ok(line.trim().to_string())
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Progress bar on stderr; a spinner when the frame count is unknown.
struct BarProgress {
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new(quiet: bool) -> Self {
        Self { quiet, bar: None }
    }
}

impl ProgressObserver for BarProgress {
    fn on_start(&mut self, estimated_frames: u64) {
        if self.quiet {
            return;
        }
        let bar = if estimated_frames > 0 {
            let bar = ProgressBar::new(estimated_frames);
            if let Ok(style) = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
            ) {
                bar.set_style(style.progress_chars("##-"));
            }
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} {pos} frames [{elapsed_precise}]")
            {
                bar.set_style(style);
            }
            bar
        };
        self.bar = Some(bar);
    }

    fn on_frame(&mut self, update: ProgressUpdate) {
        if let Some(bar) = &self.bar {
            if update.frames_composited > bar.length().unwrap_or(u64::MAX) {
                bar.set_length(update.frames_composited);
            }
            bar.set_position(update.frames_composited);
        }
    }

    fn on_finish(&mut self, _update: ProgressUpdate) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
