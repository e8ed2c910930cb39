use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "beatreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a music video from an audio track (requires `ffmpeg` on PATH).
    Generate(GenerateArgs),
    /// Render a single scene frame as a PNG, for inspecting the storyboard.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Input audio file (WAV decoded in-process, others through ffmpeg).
    #[arg(long)]
    audio: PathBuf,

    /// Title used for the output filename.
    #[arg(long, default_value = "amv")]
    title: String,

    /// Visual style prefix for background prompts.
    #[arg(long, default_value = "fun colorful 3d stage")]
    style: String,

    /// Text file with the song lyrics, one line per lyric line.
    #[arg(long)]
    lyrics_file: Option<PathBuf>,

    /// Background generation endpoint: a full URL or a Hugging Face
    /// `owner/space` id.
    #[arg(long)]
    space: Option<String>,

    /// Output directory.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input audio file; only its duration shapes the storyboard here.
    #[arg(long)]
    audio: PathBuf,

    /// Text file with the song lyrics.
    #[arg(long)]
    lyrics_file: Option<PathBuf>,

    /// Playback time of the frame, in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Frame(args) => cmd_frame(args),
    }
}

fn read_lyrics(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read lyrics '{}'", path.display())),
        None => Ok(String::new()),
    }
}

async fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut request = beatreel::GenerateRequest::new(args.audio);
    request.title = args.title;
    request.style = args.style;
    request.lyrics = read_lyrics(args.lyrics_file.as_ref())?;
    request.space_url = args.space;
    request.out_dir = args.out_dir;
    request.width = args.width;
    request.height = args.height;

    let orchestrator = beatreel::Orchestrator::new();
    let path = orchestrator.generate_to_file(&request).await?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let audio = beatreel::decode_audio(&args.audio)?;
    let analysis = beatreel::AudioAnalysis::from_audio(&audio);
    let lyrics = read_lyrics(args.lyrics_file.as_ref())?;
    let shots = beatreel::build_storyboard(analysis.duration_seconds, &lyrics);
    let backdrops = (0..shots.len())
        .map(|i| beatreel::Backdrop::Color(beatreel::fallback_color(i)))
        .collect();

    let mut scene = beatreel::SceneAnimator::new(
        analysis.duration_seconds,
        analysis.beat_timestamps,
        shots,
        backdrops,
    )?;
    scene.tick(args.time);
    let frame = scene.render(args.width, args.height);

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
