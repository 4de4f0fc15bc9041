//! Glyph grid rasterization.
//!
//! Two glyph sources are supported: the built-in 8x8 bitmap font (optionally
//! scaled by an integer factor) and a TrueType/OpenType font loaded from disk
//! at a point size. Either way the font is an owned value handed to the
//! [`Rasterizer`], never process-wide state.

use std::fmt;
use std::fs;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use font8x8::{UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::text::GlyphGrid;

/// Side of one built-in bitmap glyph, in pixels.
pub const BUILTIN_CELL: u32 = 8;

/// Largest pixel scale accepted for the built-in font.
pub const MAX_BUILTIN_SCALE: u32 = 64;

/// Point size used for custom fonts when none is given.
pub const DEFAULT_FONT_SIZE: f32 = 6.0;

#[derive(Clone)]
enum FontKind {
    Builtin { scale: u32 },
    Outline { font: FontArc, px: PxScale, point_size: f32 },
}

/// Font used to draw glyphs.
#[derive(Clone)]
pub struct GlyphFont {
    kind: FontKind,
}

impl fmt::Debug for GlyphFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FontKind::Builtin { scale } => f.debug_struct("Builtin").field("scale", scale).finish(),
            FontKind::Outline { point_size, .. } => f
                .debug_struct("Outline")
                .field("point_size", point_size)
                .finish(),
        }
    }
}

impl Default for GlyphFont {
    fn default() -> Self {
        Self::builtin()
    }
}

impl GlyphFont {
    /// The built-in 8x8 bitmap font.
    pub fn builtin() -> Self {
        Self {
            kind: FontKind::Builtin { scale: 1 },
        }
    }

    /// The built-in bitmap font with every pixel drawn as a `scale` x `scale`
    /// block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `scale` is 0 or above
    /// [`MAX_BUILTIN_SCALE`].
    pub fn builtin_scaled(scale: u32) -> Result<Self> {
        if !(1..=MAX_BUILTIN_SCALE).contains(&scale) {
            return Err(Error::parameter(
                "font_scale",
                format!("must be in 1..={MAX_BUILTIN_SCALE}, got {scale}"),
            ));
        }
        Ok(Self {
            kind: FontKind::Builtin { scale },
        })
    }

    /// Load a TrueType/OpenType font file at `point_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the file cannot be read or parsed and
    /// [`Error::InvalidParameter`] for a non-positive size.
    pub fn from_file(path: &Path, point_size: f32) -> Result<Self> {
        let data = fs::read(path).map_err(|e| Error::FontLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(data, point_size).map_err(|e| match e {
            Error::FontLoad { reason, .. } => Error::FontLoad {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse font bytes at `point_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] for unparsable data and
    /// [`Error::InvalidParameter`] for a non-positive size.
    pub fn from_bytes(data: Vec<u8>, point_size: f32) -> Result<Self> {
        if !point_size.is_finite() || point_size <= 0.0 {
            return Err(Error::parameter("font_size", format!("must be > 0, got {point_size}")));
        }
        let font = FontArc::try_from_vec(data).map_err(|e| Error::FontLoad {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        // Point size is the em size; PxScale is the ascent-to-descent height.
        let units_per_em = font.units_per_em().unwrap_or(font.height_unscaled());
        let px = PxScale::from(point_size * font.height_unscaled() / units_per_em);
        Ok(Self {
            kind: FontKind::Outline {
                font,
                px,
                point_size,
            },
        })
    }

    /// Height of one text line in pixels.
    pub fn line_height(&self) -> u32 {
        match &self.kind {
            FontKind::Builtin { scale } => BUILTIN_CELL * scale,
            FontKind::Outline { font, px, .. } => {
                let scaled = font.as_scaled(*px);
                (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32
            }
        }
    }

    /// Rendered width of one line of glyphs in pixels.
    pub fn line_width(&self, line: &[char]) -> u32 {
        match &self.kind {
            FontKind::Builtin { scale } => u32::try_from(line.len())
                .unwrap_or(u32::MAX)
                .saturating_mul(BUILTIN_CELL * scale),
            FontKind::Outline { font, px, .. } => {
                let scaled = font.as_scaled(*px);
                let mut width = 0.0f32;
                let mut prev: Option<GlyphId> = None;
                for &ch in line {
                    let id = scaled.glyph_id(ch);
                    if let Some(p) = prev {
                        width += scaled.kern(p, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }
                width.ceil().max(0.0) as u32
            }
        }
    }

    fn draw_line(&self, band: &mut [u8], band_width: u32, line: &[char], fg: Rgb<u8>) {
        match &self.kind {
            FontKind::Builtin { scale } => draw_bitmap_line(band, band_width, line, *scale, fg),
            FontKind::Outline { font, px, .. } => {
                draw_outline_line(band, band_width, self.line_height(), font, *px, line, fg);
            }
        }
    }
}

fn bitmap(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BLOCK_FONTS.get(ch))
        .or_else(|| BOX_FONTS.get(ch))
        .unwrap_or([0; 8])
}

fn draw_bitmap_line(band: &mut [u8], band_width: u32, line: &[char], scale: u32, fg: Rgb<u8>) {
    let stride = band_width as usize * 3;
    let cell = (BUILTIN_CELL * scale) as usize;
    for (col, &ch) in line.iter().enumerate() {
        let x0 = col * cell;
        for (gy, &bits) in bitmap(ch).iter().enumerate() {
            for gx in 0..BUILTIN_CELL as usize {
                // bit 0 is the leftmost pixel
                if (bits >> gx) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale as usize {
                    let row = (gy * scale as usize + dy) * stride;
                    for dx in 0..scale as usize {
                        let x = x0 + gx * scale as usize + dx;
                        if x >= band_width as usize {
                            continue;
                        }
                        let idx = row + x * 3;
                        band[idx..idx + 3].copy_from_slice(&fg.0);
                    }
                }
            }
        }
    }
}

fn draw_outline_line(
    band: &mut [u8],
    band_width: u32,
    band_height: u32,
    font: &FontArc,
    px: PxScale,
    line: &[char],
    fg: Rgb<u8>,
) {
    let scaled = font.as_scaled(px);
    let stride = band_width as usize * 3;
    let mut caret = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for &ch in line {
        let id = scaled.glyph_id(ch);
        if let Some(p) = prev {
            caret += scaled.kern(p, id);
        }
        let glyph = id.with_scale_and_position(px, point(caret, scaled.ascent()));
        caret += scaled.h_advance(id);
        prev = Some(id);

        let Some(outline) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outline.px_bounds();
        outline.draw(|gx, gy, coverage| {
            let x = bounds.min.x as i64 + i64::from(gx);
            let y = bounds.min.y as i64 + i64::from(gy);
            if x < 0 || y < 0 || x >= i64::from(band_width) || y >= i64::from(band_height) {
                return;
            }
            let idx = y as usize * stride + x as usize * 3;
            let a = coverage.clamp(0.0, 1.0);
            for c in 0..3 {
                let under = f32::from(band[idx + c]);
                band[idx + c] = (f32::from(fg.0[c]) * a + under * (1.0 - a)).round() as u8;
            }
        });
    }
}

/// Draws glyph grids into RGB images with a fixed font and color pair.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    font: GlyphFont,
    foreground: Rgb<u8>,
    background: Rgb<u8>,
}

impl Rasterizer {
    pub fn new(font: GlyphFont, foreground: Rgb<u8>, background: Rgb<u8>) -> Self {
        Self {
            font,
            foreground,
            background,
        }
    }

    pub fn font(&self) -> &GlyphFont {
        &self.font
    }

    /// Pixel size of the image [`render`](Self::render) produces for `grid`:
    /// the widest line by `line_height * rows`.
    pub fn dimensions_for(&self, grid: &GlyphGrid) -> (u32, u32) {
        let width = grid
            .rows()
            .map(|row| self.font.line_width(row))
            .max()
            .unwrap_or(0)
            .max(1);
        (width, self.font.line_height().saturating_mul(grid.height()))
    }

    /// Draw `grid` onto a background-filled canvas, one text line per
    /// `line_height` band, glyphs left to right.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for a grid without glyphs.
    pub fn render(&self, grid: &GlyphGrid) -> Result<RgbImage> {
        if grid.is_empty() {
            return Err(Error::EmptyInput("glyph grid"));
        }

        let (width, height) = self.dimensions_for(grid);
        let mut canvas = RgbImage::from_pixel(width, height, self.background);
        let band_size = width as usize * 3 * self.font.line_height() as usize;
        let rows: Vec<&[char]> = grid.rows().collect();

        let buf: &mut [u8] = &mut canvas;
        buf.par_chunks_exact_mut(band_size)
            .zip(rows.par_iter())
            .for_each(|(band, row)| self.font.draw_line(band, width, row, self.foreground));

        Ok(canvas)
    }
}
