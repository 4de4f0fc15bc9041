//! # asciivid - ASCII Art Video Renderer
//!
//! `asciivid` turns a video into a new video whose every frame is the source
//! frame drawn as colored text.
//!
//! ## Features
//!
//! - Tone mapping (brightness, contrast, gamma, histogram equalization)
//! - Configurable glyph palettes, mapped through a 256-entry lookup table
//! - Built-in 8x8 bitmap font or any TrueType/OpenType font
//! - Frame skipping and lazy, forward-only decoding
//! - Parallel rendering with `rayon`
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use asciivid::{AsciiVideoConverter, RenderConfig};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = AsciiVideoConverter::new();
//! let config = RenderConfig::default().with_width(120).with_frame_skip(2);
//! let output = converter.convert_video(Path::new("clip.mp4"), &config)?;
//! println!("wrote {}", output.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use asciivid::{AsciiVideoConverter, ProgressPhase, RenderConfig};
//! use std::path::Path;
//!
//! let converter = AsciiVideoConverter::new();
//! converter
//!     .convert_video_with_progress(
//!         Path::new("clip.mp4"),
//!         Path::new("clip_ascii.mp4"),
//!         &RenderConfig::default(),
//!         |progress| match progress.phase {
//!             ProgressPhase::ProcessingFrames => println!("{}", progress.message),
//!             ProgressPhase::Encoding => println!("Encoding..."),
//!             ProgressPhase::Complete => println!("Done!"),
//!         },
//!     )
//!     .unwrap();
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod lut;
pub mod pipeline;
pub mod raster;
pub mod sequence;
pub mod text;
pub mod tone;
pub mod video;

pub use error::{Error, Result};
pub use lut::{GlyphLut, DEFAULT_PALETTE};
pub use pipeline::{FramePipeline, OutputFps, RenderConfig, DEFAULT_FPS, DEFAULT_WIDTH};
pub use raster::{GlyphFont, Rasterizer, DEFAULT_FONT_SIZE};
pub use sequence::{render_first_frame, FrameSequence, SourceInfo, SourceOpener, VideoSource};
pub use text::GlyphGrid;
pub use tone::ToneParams;
pub use video::{output_path_for, FfmpegAssembler, FfmpegOpener, FfmpegSource, VideoAssembler};

/// Represents the current phase of a conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Decoding and rendering retained frames
    ProcessingFrames,
    /// Handing rendered frames to the encoder
    Encoding,
    /// Output written
    Complete,
}

/// Progress information for a conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the conversion
    pub phase: ProgressPhase,
    /// Source index of the frame being processed, or frames written
    pub completed: usize,
    /// Total source frames (0 if unknown)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// About to process source frame `index` of `total`.
    pub fn processing_frame(index: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (index as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ProcessingFrames,
            completed: index,
            total,
            percentage,
            message: format!("Processing frame {index}/{total}"),
        }
    }

    /// All frames rendered, encoding started.
    pub fn encoding(frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Encoding,
            completed: frames,
            total: frames,
            percentage: 100.0,
            message: "Combining frames into video...".to_string(),
        }
    }

    pub fn complete(frames: usize, output: &Path) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: frames,
            total: frames,
            percentage: 100.0,
            message: format!("Done! Video saved as: {}", output.display()),
        }
    }
}

/// Named quality preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub width: u32,
    pub fps: f64,
    pub font_size: f32,
    pub gamma: f64,
    pub frame_skip: u32,
}

impl Preset {
    /// Render configuration for this preset with the given palette. The font
    /// stays the built-in one; `font_size` applies when a font file is loaded.
    pub fn render_config(&self, palette: &str) -> RenderConfig {
        RenderConfig::default()
            .with_width(self.width)
            .with_fps(OutputFps::Fixed(self.fps))
            .with_gamma(self.gamma)
            .with_frame_skip(self.frame_skip)
            .with_palette(palette)
    }
}

fn default_palette() -> String {
    DEFAULT_PALETTE.to_string()
}

/// Application configuration: presets and palette
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    pub default_preset: String,
    #[serde(default = "default_palette")]
    pub palette: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let preset = |width, fps, font_size, frame_skip| Preset {
            width,
            fps,
            font_size,
            gamma: tone::DEFAULT_GAMMA,
            frame_skip,
        };
        let presets = HashMap::from([
            ("default".to_string(), preset(DEFAULT_WIDTH, DEFAULT_FPS, DEFAULT_FONT_SIZE, 1)),
            ("small".to_string(), preset(120, 12.0, 8.0, 2)),
            ("large".to_string(), preset(480, 24.0, 4.0, 1)),
        ]);
        Self {
            presets,
            default_preset: "default".to_string(),
            palette: default_palette(),
        }
    }
}

impl AppConfig {
    /// Name of the configuration file searched for by [`AppConfig::load`].
    pub const FILE_NAME: &'static str = "asciivid.json";

    /// Look for a config in the user data directory, then the working
    /// directory. Falls back to the built-in defaults when neither exists.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a config file exists but is invalid.
    pub fn load() -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::data_dir() {
            candidates.push(dir.join("asciivid").join(Self::FILE_NAME));
        }
        candidates.push(PathBuf::from(Self::FILE_NAME));

        match candidates.into_iter().find(|p| p.is_file()) {
            Some(path) => {
                log::info!("using config {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// [`Error::Config`] if the file cannot be read, is not valid JSON, or has
    /// an empty palette.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_error = |reason: String| Error::Config {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?;
        if config.palette.is_empty() {
            return Err(config_error("palette must not be empty".to_string()));
        }
        if !config.presets.contains_key(&config.default_preset) {
            return Err(config_error(format!("default preset '{}' is not defined", config.default_preset)));
        }
        Ok(config)
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Render configuration of the named preset.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if no such preset exists.
    pub fn render_config(&self, preset_name: &str) -> Result<RenderConfig> {
        let preset = self
            .preset(preset_name)
            .ok_or_else(|| Error::parameter("preset", format!("'{preset_name}' not found")))?;
        Ok(preset.render_config(&self.palette))
    }
}

/// Main converter: drives the per-frame pipeline between a video source and
/// an assembler.
pub struct AsciiVideoConverter<O = FfmpegOpener, A = FfmpegAssembler> {
    opener: O,
    assembler: A,
    batch_size: usize,
}

impl AsciiVideoConverter {
    /// Converter backed by `ffmpeg`/`ffprobe` on `PATH`.
    pub fn new() -> Self {
        Self::with_backends(FfmpegOpener::default(), FfmpegAssembler::default())
    }
}

impl Default for AsciiVideoConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: SourceOpener, A: VideoAssembler> AsciiVideoConverter<O, A> {
    pub fn with_backends(opener: O, assembler: A) -> Self {
        Self {
            opener,
            assembler,
            batch_size: rayon::current_num_threads().max(1),
        }
    }

    /// Frames rendered in parallel per batch (1 renders serially).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    /// Lazy sequence of rendered frames of `input`.
    ///
    /// # Errors
    ///
    /// Configuration errors only; the source is opened on the first pull.
    pub fn frames(&self, input: &Path, config: &RenderConfig) -> Result<FrameSequence<'_, &O>> {
        let pipeline = FramePipeline::new(config)?;
        Ok(FrameSequence::new(input, &self.opener, pipeline, config.frame_skip).with_batch_size(self.batch_size))
    }

    /// Convert `input` to `<file name>_ASCII.mp4` beside it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use asciivid::{AsciiVideoConverter, OutputFps, RenderConfig};
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RenderConfig::default().with_fps(OutputFps::MatchSource);
    /// let output = AsciiVideoConverter::new().convert_video(Path::new("clip.mp4"), &config)?;
    /// assert!(output.ends_with("clip.mp4_ASCII.mp4"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert_video(&self, input: &Path, config: &RenderConfig) -> Result<PathBuf> {
        let output = output_path_for(input);
        self.convert_video_with_progress(input, &output, config, |_| {})?;
        Ok(output)
    }

    /// Convert `input` into `output`, reporting each phase to `progress`.
    /// Returns the number of frames written.
    ///
    /// # Errors
    ///
    /// Configuration errors before anything is opened, source errors while
    /// decoding, [`Error::EmptyInput`] if no frame was retained, and encoder
    /// errors while writing.
    pub fn convert_video_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        config: &RenderConfig,
        progress: F,
    ) -> Result<usize>
    where
        F: Fn(Progress) + Send + Sync,
    {
        log::info!("converting {} -> {}", input.display(), output.display());
        let result = self.run(input, output, config, &progress);
        if let Err(e) = &result {
            log::error!("conversion of {} failed: {e}", input.display());
        }
        result
    }

    fn run<F>(&self, input: &Path, output: &Path, config: &RenderConfig, progress: &F) -> Result<usize>
    where
        F: Fn(Progress) + Send + Sync,
    {
        let mut sequence = self.frames(input, config)?.with_progress(|p| progress(p));
        let rendered = sequence.by_ref().collect::<Result<Vec<RgbImage>>>()?;

        let fps = match config.fps {
            OutputFps::Fixed(fps) => fps,
            OutputFps::MatchSource => sequence
                .source_info()
                .and_then(|info| info.fps)
                .filter(|fps| fps.is_finite() && *fps > 0.0)
                .unwrap_or_else(|| {
                    log::warn!("{}: source frame rate unknown, using {DEFAULT_FPS}", input.display());
                    DEFAULT_FPS
                }),
        };
        drop(sequence);

        progress(Progress::encoding(rendered.len()));
        self.assembler.assemble(&rendered, fps, output)?;
        progress(Progress::complete(rendered.len(), output));
        log::info!("wrote {} frames at {fps} fps to {}", rendered.len(), output.display());
        Ok(rendered.len())
    }

    /// Render the first frame of `input` only, for checking settings before a
    /// full run.
    ///
    /// # Errors
    ///
    /// As [`render_first_frame`].
    pub fn preview(&self, input: &Path, config: &RenderConfig) -> Result<RgbImage> {
        let pipeline = FramePipeline::new(config)?;
        let frame = render_first_frame(input, &self.opener, &pipeline)?;
        log::info!("preview of {}: {}x{}", input.display(), frame.width(), frame.height());
        Ok(frame)
    }
}
