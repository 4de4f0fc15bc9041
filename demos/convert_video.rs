//! Example: Convert a video to an ASCII-art video using asciivid as a library
//!
//! Run with: cargo run --example convert_video -- path/to/clip.mp4

use asciivid::{AsciiVideoConverter, OutputFps, ProgressPhase, RenderConfig};
use image::Rgb;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "clip.mp4".to_string()));
    if !input.exists() {
        println!("Note: {} not found.", input.display());
        println!("Pass a video file path as the first argument.");
        return Ok(());
    }

    let config = RenderConfig::default()
        .with_width(160)
        .with_frame_skip(2)
        .with_foreground(Rgb([255, 176, 0]))
        .with_fps(OutputFps::MatchSource);

    let output = asciivid::output_path_for(&input);
    let converter = AsciiVideoConverter::new();
    let frames = converter.convert_video_with_progress(&input, &output, &config, |progress| {
        if progress.phase == ProgressPhase::ProcessingFrames && progress.completed % 10 != 0 {
            return;
        }
        println!("{} ({:.0}%)", progress.message, progress.percentage);
    })?;

    println!("Wrote {frames} frames to {}", output.display());
    Ok(())
}
