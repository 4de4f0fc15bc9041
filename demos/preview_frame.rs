//! Example: Render the first frame of a video as text and as an image
//!
//! Run with: cargo run --example preview_frame -- path/to/clip.mp4

use asciivid::{FfmpegOpener, FramePipeline, RenderConfig, SourceOpener, VideoSource};
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "clip.mp4".to_string()));
    if !input.exists() {
        println!("Note: {} not found.", input.display());
        return Ok(());
    }

    let pipeline = FramePipeline::new(&RenderConfig::default().with_width(100))?;
    let mut source = FfmpegOpener::default().open(&input)?;
    let Some(frame) = source.next_frame()? else {
        println!("{} has no frames", input.display());
        return Ok(());
    };
    drop(source);

    let grid = pipeline.frame_to_grid(&frame)?;
    println!("{grid}");

    let image = pipeline.rasterizer().render(&grid)?;
    image.save("preview.png")?;
    println!("Output dimensions: {}x{} (saved preview.png)", image.width(), image.height());
    Ok(())
}
