use anyhow::{anyhow, Context, Result};
use asciivid::{
    output_path_for, AppConfig, AsciiVideoConverter, GlyphFont, OutputFps, Progress, ProgressPhase,
};
use clap::Parser;
use dialoguer::{Confirm, FuzzySelect, Input};
use image::Rgb;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::path::PathBuf;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v"];

#[derive(Parser, Debug)]
#[command(version, about = "Render a video as ASCII art and encode the result as a new video.")]
struct Args {
    /// Input video file
    input: Option<PathBuf>,

    /// Output video (default: <input file name>_ASCII.mp4 beside the input)
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Glyph columns per row
    #[arg(long)]
    width: Option<u32>,

    /// Keep every Nth source frame
    #[arg(long)]
    frame_skip: Option<u32>,

    /// Tone mapping gamma (> 0)
    #[arg(long)]
    gamma: Option<f64>,

    /// Brightness offset added to every intensity
    #[arg(long, allow_hyphen_values = true)]
    brightness: Option<f64>,

    /// Contrast offset (gain is contrast / 127 + 1)
    #[arg(long, allow_hyphen_values = true)]
    contrast: Option<f64>,

    /// Glyphs ordered light to dense
    #[arg(long)]
    palette: Option<String>,

    /// Glyph color as R,G,B
    #[arg(long, value_parser = parse_color)]
    color: Option<Rgb<u8>>,

    /// TrueType/OpenType font file (default: built-in 8x8 bitmap font)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Font size in points, used with --font
    #[arg(long)]
    font_size: Option<f32>,

    /// Output frames per second
    #[arg(long, conflicts_with = "match_fps")]
    fps: Option<f64>,

    /// Use the frame rate of the source video
    #[arg(long, default_value_t = false)]
    match_fps: bool,

    /// Worker threads for rendering
    #[arg(long)]
    jobs: Option<usize>,

    /// Render only the first frame and save it as a PNG
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Use default quality preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["small", "large"])]
    default: bool,

    /// Use the small quality preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "large"])]
    small: bool,

    /// Use the large quality preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "small"])]
    large: bool,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Append log records to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_color(s: &str) -> std::result::Result<Rgb<u8>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected R,G,B, got '{s}'"));
    };
    let channel = |v: &str| v.parse::<u8>().map_err(|e| format!("bad channel '{v}': {e}"));
    Ok(Rgb([channel(r)?, channel(g)?, channel(b)?]))
}

fn init_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(args.log_level.parse().unwrap_or(log::LevelFilter::Warn));
    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_logging(&args)?;
    let is_interactive = !(args.default || args.small || args.large);

    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build_global()
            .context("configuring worker threads")?;
    }

    // --- Interactive Prompts ---
    if args.input.is_none() {
        if !is_interactive {
            return Err(anyhow!("Input file must be provided when using a preset."));
        }
        let files = find_video_files();
        if files.is_empty() {
            return Err(anyhow!("No video files found in current directory."));
        }
        let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
            .with_prompt("Choose an input video")
            .default(0)
            .items(&files)
            .interact()?;
        args.input = Some(PathBuf::from(&files[selection]));
    }
    let input_path = args
        .input
        .clone()
        .ok_or_else(|| anyhow!("Input file must be provided"))?;
    if !input_path.is_file() {
        return Err(anyhow!("Input path does not exist: {}", input_path.display()));
    }

    // Load config and decide preset
    let cfg = AppConfig::load()?;
    let active_preset_name = if args.small {
        "small"
    } else if args.large {
        "large"
    } else {
        cfg.default_preset.as_str()
    };
    let active = cfg
        .preset(active_preset_name)
        .ok_or_else(|| anyhow!("Missing preset '{}' in config", active_preset_name))?
        .clone();

    if is_interactive {
        if args.width.is_none() {
            args.width = Some(
                Input::new()
                    .with_prompt("ASCII width (columns)")
                    .default(active.width)
                    .interact()?,
            );
        }
        if args.gamma.is_none() {
            args.gamma = Some(Input::new().with_prompt("Gamma").default(active.gamma).interact()?);
        }
        if args.frame_skip.is_none() {
            args.frame_skip = Some(
                Input::new()
                    .with_prompt("Keep every Nth frame")
                    .default(active.frame_skip)
                    .interact()?,
            );
        }
        if args.fps.is_none() && !args.match_fps {
            args.match_fps = Confirm::new()
                .with_prompt("Match source FPS?")
                .default(false)
                .interact()?;
            if !args.match_fps {
                args.fps = Some(
                    Input::new()
                        .with_prompt("Output FPS")
                        .default(active.fps)
                        .interact()?,
                );
            }
        }
    }

    let mut config = active.render_config(args.palette.as_deref().unwrap_or(&cfg.palette));
    if let Some(width) = args.width {
        config = config.with_width(width);
    }
    if let Some(skip) = args.frame_skip {
        config = config.with_frame_skip(skip);
    }
    if let Some(gamma) = args.gamma {
        config = config.with_gamma(gamma);
    }
    if let Some(brightness) = args.brightness {
        config = config.with_brightness(brightness);
    }
    if let Some(contrast) = args.contrast {
        config = config.with_contrast(contrast);
    }
    if let Some(color) = args.color {
        config = config.with_foreground(color);
    }
    if args.match_fps {
        config = config.with_fps(OutputFps::MatchSource);
    } else if let Some(fps) = args.fps {
        config = config.with_fps(OutputFps::Fixed(fps));
    }
    if let Some(font_path) = &args.font {
        let size = args.font_size.unwrap_or(active.font_size);
        config = config.with_font(GlyphFont::from_file(font_path, size)?);
    }
    config.validate()?;

    let converter = AsciiVideoConverter::new();

    // --- Preview ---
    if let Some(preview_path) = &args.preview {
        let frame = converter.preview(&input_path, &config)?;
        frame
            .save(preview_path)
            .with_context(|| format!("writing preview {}", preview_path.display()))?;
        println!("Output dimensions: {}x{}", frame.width(), frame.height());
        println!("Preview saved as: {}", preview_path.display());
        return Ok(());
    }

    // --- Execution ---
    let output_path = args.out.clone().unwrap_or_else(|| output_path_for(&input_path));
    if is_interactive
        && output_path.exists()
        && !Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output_path.display()))
            .default(false)
            .interact()?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let frames = converter.convert_video_with_progress(&input_path, &output_path, &config, |progress: Progress| {
        match progress.phase {
            ProgressPhase::ProcessingFrames => {
                if progress.total > 0 {
                    pb.set_length(progress.total as u64);
                }
                pb.set_position(progress.completed as u64 + 1);
            }
            ProgressPhase::Encoding => pb.set_message(progress.message),
            ProgressPhase::Complete => pb.finish_with_message("Done"),
        }
    });
    if frames.is_err() {
        pb.abandon();
    }
    let frames = frames?;

    println!("\nDone! Video saved as: {}", output_path.display());
    println!("Frames written: {frames}");
    Ok(())
}

fn find_video_files() -> Vec<String> {
    WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect()
}
