use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use vidmark::{
    Anchor, ComposeRequest, ComposeSummary, ErrorCode, FfmpegBackend, LengthUnit, TaskCallbacks,
    TaskManager, TaskOutcome, VideoCodec,
};

#[derive(Parser, Debug)]
#[command(name = "vidmark", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watermark a video (requires `ffmpeg` and `ffprobe` on PATH).
    Compose(ComposeArgs),
    /// Print track descriptors and the resolved render geometry as JSON.
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct ComposeArgs {
    /// Request document (JSON). Flags below override its fields.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Input video.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output video. Defaults to a generated path in the temp directory.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Watermark image file.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Watermark text (ignored when an image is given).
    #[arg(long)]
    text: Option<String>,

    #[arg(long)]
    anchor: Option<Anchor>,

    #[arg(long)]
    margin: Option<f64>,

    /// `absolute` (pixels) or `percent` (fraction of the canvas).
    #[arg(long)]
    margin_unit: Option<LengthUnit>,

    #[arg(long)]
    offset_x: Option<f64>,

    #[arg(long)]
    offset_y: Option<f64>,

    #[arg(long)]
    offset_unit: Option<LengthUnit>,

    /// Overlay opacity in [0, 1].
    #[arg(long)]
    opacity: Option<f64>,

    /// Overlay width as a fraction of the video width.
    #[arg(long)]
    width_percent: Option<f64>,

    #[arg(long)]
    codec: Option<VideoCodec>,

    /// Video bitrate in bits per second.
    #[arg(long)]
    bitrate: Option<u64>,

    /// Text size in pixels before scaling.
    #[arg(long)]
    font_size: Option<f32>,

    /// Task id used in logs and the generated output name.
    #[arg(long, default_value = "cli")]
    id: String,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish()).ok();
    } else {
        tracing::subscriber::set_global_default(builder.with_target(false).finish()).ok();
    }
}

fn build_request(args: ComposeArgs) -> anyhow::Result<ComposeRequest> {
    let mut req = match args.request.as_deref() {
        Some(doc) => ComposeRequest::from_json_path(doc)?,
        None => ComposeRequest::default(),
    };

    if let Some(p) = args.in_path {
        req.input_path = p;
    }
    if args.out.is_some() {
        req.output_path = args.out;
    }
    if let Some(p) = args.image {
        let bytes =
            std::fs::read(&p).with_context(|| format!("read watermark image '{}'", p.display()))?;
        req.image = Some(bytes);
    }
    if args.text.is_some() {
        req.text = args.text;
    }
    if let Some(v) = args.anchor {
        req.placement.anchor = v;
    }
    if let Some(v) = args.margin {
        req.placement.margin = v;
    }
    if let Some(v) = args.margin_unit {
        req.placement.margin_unit = v;
    }
    if let Some(v) = args.offset_x {
        req.placement.offset_x = v;
    }
    if let Some(v) = args.offset_y {
        req.placement.offset_y = v;
    }
    if let Some(v) = args.offset_unit {
        req.placement.offset_unit = v;
    }
    if let Some(v) = args.opacity {
        req.opacity = v;
    }
    if let Some(v) = args.width_percent {
        req.width_percent = v;
    }
    if let Some(v) = args.codec {
        req.codec = v;
    }
    if args.bitrate.is_some() {
        req.bitrate = args.bitrate;
    }
    if let Some(v) = args.font_size {
        req.text_style.font_size_px = v;
    }

    if req.input_path.as_os_str().is_empty() {
        anyhow::bail!("an input video is required (--in or a request document)");
    }
    req.validate()?;
    Ok(req)
}

struct CliCallbacks {
    last_percent: i64,
}

impl TaskCallbacks for CliCallbacks {
    fn on_progress(&mut self, task_id: &str, fraction: f64, eta_secs: f64) {
        let percent = (fraction * 100.0).floor() as i64;
        if percent >= self.last_percent + 5 {
            self.last_percent = percent;
            tracing::info!(task = %task_id, percent, eta_secs = (eta_secs * 10.0).round() / 10.0, "progress");
        }
    }

    fn on_completed(&mut self, task_id: &str, summary: &ComposeSummary) {
        tracing::info!(task = %task_id, out = %summary.output_path.display(), "done");
    }

    fn on_error(&mut self, task_id: &str, code: ErrorCode, message: &str) {
        tracing::error!(task = %task_id, code = %code, "{message}");
    }
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let id = args.id.clone();
    let request = build_request(args)?;

    let manager = TaskManager::new(Arc::new(FfmpegBackend));
    let ticket = manager.start(request, id)?;
    let outcome = ticket.drive(&mut CliCallbacks { last_percent: -5 });

    match outcome {
        TaskOutcome::Completed(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        TaskOutcome::Cancelled => anyhow::bail!("cancelled"),
        TaskOutcome::Failed { code, message } => anyhow::bail!("{code}: {message}"),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let probe = vidmark::probe_tracks(&args.in_path)?;
    let geometry = vidmark::resolve_render_geometry(&probe.video)?;
    let report = serde_json::json!({
        "probe": probe,
        "geometry": geometry,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
