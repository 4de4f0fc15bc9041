//! Per-frame transform: frame -> glyph grid -> rendered image.

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::lut::{GlyphLut, DEFAULT_PALETTE};
use crate::raster::{GlyphFont, Rasterizer};
use crate::text::{frame_to_grid, GlyphGrid, DEFAULT_VERTICAL_COMPRESSION};
use crate::tone::{ToneParams, DEFAULT_GAMMA};

/// Frame rate of the assembled video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFps {
    /// A fixed rate in frames per second.
    Fixed(f64),
    /// Reuse the rate reported by the source video.
    MatchSource,
}

impl Default for OutputFps {
    fn default() -> Self {
        Self::Fixed(DEFAULT_FPS)
    }
}

/// Output rate when neither a fixed rate nor a source rate is known.
pub const DEFAULT_FPS: f64 = 15.0;

/// Glyph columns per row when none is configured.
pub const DEFAULT_WIDTH: u32 = 300;

/// Immutable parameters of one conversion run.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Glyph columns per output row
    pub width: u32,
    /// Keep every Nth source frame (1 keeps all)
    pub frame_skip: u32,
    /// Tone mapping gamma, strictly positive
    pub gamma: f64,
    /// Additive brightness offset
    pub brightness: f64,
    /// Contrast offset, gain is `contrast / 127 + 1`
    pub contrast: f64,
    /// Glyphs ordered light to dense
    pub palette: String,
    /// Glyph color
    pub foreground: Rgb<u8>,
    /// Canvas color
    pub background: Rgb<u8>,
    /// Font the glyphs are drawn with
    pub font: GlyphFont,
    /// Output video frame rate
    pub fps: OutputFps,
    /// Row count factor applied to the source aspect ratio
    pub vertical_compression: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            frame_skip: 1,
            gamma: DEFAULT_GAMMA,
            brightness: 0.0,
            contrast: 0.0,
            palette: DEFAULT_PALETTE.to_string(),
            foreground: Rgb([0, 255, 0]),
            background: Rgb([0, 0, 0]),
            font: GlyphFont::builtin(),
            fps: OutputFps::default(),
            vertical_compression: DEFAULT_VERTICAL_COMPRESSION,
        }
    }
}

impl RenderConfig {
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = frame_skip;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_brightness(mut self, brightness: f64) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn with_contrast(mut self, contrast: f64) -> Self {
        self.contrast = contrast;
        self
    }

    pub fn with_palette(mut self, palette: impl Into<String>) -> Self {
        self.palette = palette.into();
        self
    }

    pub fn with_foreground(mut self, color: Rgb<u8>) -> Self {
        self.foreground = color;
        self
    }

    pub fn with_background(mut self, color: Rgb<u8>) -> Self {
        self.background = color;
        self
    }

    pub fn with_font(mut self, font: GlyphFont) -> Self {
        self.font = font;
        self
    }

    pub fn with_fps(mut self, fps: OutputFps) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_vertical_compression(mut self, factor: f64) -> Self {
        self.vertical_compression = factor;
        self
    }

    /// Tone mapping parameters of this run.
    pub fn tone(&self) -> ToneParams {
        ToneParams {
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
        }
    }

    /// Check every field once, before any frame is touched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPalette`] for an empty palette, otherwise
    /// [`Error::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(Error::parameter("width", "must be at least 1"));
        }
        if self.frame_skip == 0 {
            return Err(Error::parameter("frame_skip", "must be at least 1"));
        }
        if self.palette.is_empty() {
            return Err(Error::InvalidPalette);
        }
        if !self.vertical_compression.is_finite() || self.vertical_compression <= 0.0 {
            return Err(Error::parameter(
                "vertical_compression",
                format!("must be > 0, got {}", self.vertical_compression),
            ));
        }
        if let OutputFps::Fixed(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(Error::parameter("fps", format!("must be > 0, got {fps}")));
            }
        }
        self.tone().validate()
    }
}

/// Stateless frame transform built once per run.
///
/// Holds only read-only data (LUT, tone parameters, font), so one pipeline can
/// be shared across threads.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    lut: GlyphLut,
    tone: ToneParams,
    columns: u32,
    compression: f64,
    rasterizer: Rasterizer,
}

impl FramePipeline {
    /// Validate `config` and build the LUT and rasterizer.
    ///
    /// # Errors
    ///
    /// Any error of [`RenderConfig::validate`].
    pub fn new(config: &RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lut: GlyphLut::new(&config.palette)?,
            tone: config.tone(),
            columns: config.width,
            compression: config.vertical_compression,
            rasterizer: Rasterizer::new(config.font.clone(), config.foreground, config.background),
        })
    }

    pub fn lut(&self) -> &GlyphLut {
        &self.lut
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    /// Text stage only.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDimensions`] if the frame collapses to zero rows.
    pub fn frame_to_grid(&self, frame: &RgbImage) -> Result<GlyphGrid> {
        frame_to_grid(frame, self.columns, self.compression, &self.tone, &self.lut)
    }

    /// Convert and rasterize one frame.
    ///
    /// # Errors
    ///
    /// Errors of [`frame_to_grid`](Self::frame_to_grid) and
    /// [`Rasterizer::render`].
    pub fn render(&self, frame: &RgbImage) -> Result<RgbImage> {
        let grid = self.frame_to_grid(frame)?;
        self.rasterizer.render(&grid)
    }

    /// Render independent frames in parallel; output order matches input.
    ///
    /// # Errors
    ///
    /// The first error hit by any frame.
    pub fn render_batch(&self, frames: &[RgbImage]) -> Result<Vec<RgbImage>> {
        frames.par_iter().map(|frame| self.render(frame)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::BUILTIN_CELL;

    #[test]
    fn default_config_validates() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_fields_are_named() {
        let cases = [
            (RenderConfig::default().with_width(0), "width"),
            (RenderConfig::default().with_frame_skip(0), "frame_skip"),
            (RenderConfig::default().with_gamma(0.0), "gamma"),
            (RenderConfig::default().with_gamma(-0.4), "gamma"),
            (RenderConfig::default().with_fps(OutputFps::Fixed(0.0)), "fps"),
            (RenderConfig::default().with_vertical_compression(0.0), "vertical_compression"),
        ];
        for (config, field) in cases {
            match FramePipeline::new(&config) {
                Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, field),
                other => panic!("expected {field} error, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_palette_fails_whole_build() {
        let config = RenderConfig::default().with_palette("");
        assert!(matches!(FramePipeline::new(&config), Err(Error::InvalidPalette)));
    }

    #[test]
    fn render_size_matches_grid() {
        let config = RenderConfig::default().with_width(40);
        let pipeline = FramePipeline::new(&config).unwrap();
        let frame = RgbImage::from_pixel(160, 90, Rgb([30, 60, 90]));
        let img = pipeline.render(&frame).unwrap();
        // floor(90 / 160 * 40 * 0.55) = 12 rows
        assert_eq!(img.dimensions(), (40 * BUILTIN_CELL, 12 * BUILTIN_CELL));
    }

    #[test]
    fn batch_preserves_order() {
        let pipeline = FramePipeline::new(&RenderConfig::default().with_width(8)).unwrap();
        let frames: Vec<RgbImage> = (0..6u8)
            .map(|i| {
                RgbImage::from_fn(32, 32, |x, y| {
                    let v = ((x + y) as u8).wrapping_mul(i + 1);
                    Rgb([v, v, v])
                })
            })
            .collect();
        let batch = pipeline.render_batch(&frames).unwrap();
        assert_eq!(batch.len(), frames.len());
        for (frame, rendered) in frames.iter().zip(&batch) {
            assert_eq!(pipeline.render(frame).unwrap().as_raw(), rendered.as_raw());
        }
    }

    #[test]
    fn foreground_color_reaches_pixels() {
        let config = RenderConfig::default()
            .with_width(4)
            .with_foreground(Rgb([255, 0, 128]));
        let pipeline = FramePipeline::new(&config).unwrap();
        let img = pipeline.render(&RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]))).unwrap();
        assert!(img.pixels().any(|p| *p == Rgb([255, 0, 128])));
        assert!(img.pixels().all(|p| *p == Rgb([255, 0, 128]) || *p == Rgb([0, 0, 0])));
    }
}
