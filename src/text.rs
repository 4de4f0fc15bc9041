//! Frame to glyph grid conversion.

use std::fmt;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{GrayImage, Luma, RgbImage};

use crate::error::{Error, Result};
use crate::lut::GlyphLut;
use crate::tone::{tone_map, ToneParams};

/// Row count factor compensating for glyph cells being taller than wide.
pub const DEFAULT_VERTICAL_COMPRESSION: f64 = 0.55;

/// Rectangular block of glyphs, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphGrid {
    width: u32,
    height: u32,
    glyphs: Vec<char>,
}

impl GlyphGrid {
    /// Wrap `glyphs` as a `width` x `height` grid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] if the glyph count does not equal
    /// `width * height`.
    pub fn new(width: u32, height: u32, glyphs: Vec<char>) -> Result<Self> {
        if glyphs.len() != width as usize * height as usize {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            glyphs,
        })
    }

    /// Build a grid from text lines. Lines must all hold the same number of
    /// glyphs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] for ragged lines.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let height = lines.len() as u32;
        let width = lines
            .first()
            .map_or(0, |l| l.as_ref().chars().count()) as u32;
        let glyphs: Vec<char> = lines.iter().flat_map(|l| l.as_ref().chars()).collect();
        Self::new(width, height, glyphs)
    }

    /// Glyphs per row.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when the grid holds no glyphs.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Glyph at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<char> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.glyphs
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[char]> {
        self.glyphs.chunks(self.width.max(1) as usize)
    }

    /// All glyphs, row-major.
    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }
}

impl fmt::Display for GlyphGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            for ch in row {
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}

/// Number of text rows for a source of `src_width` x `src_height` rendered at
/// `columns` glyphs per row: `floor(src_height / src_width * columns * compression)`.
pub fn grid_height(src_width: u32, src_height: u32, columns: u32, compression: f64) -> u32 {
    if src_width == 0 {
        return 0;
    }
    let aspect = f64::from(src_height) / f64::from(src_width);
    (aspect * f64::from(columns) * compression).floor().max(0.0) as u32
}

/// Area-average resample of an RGB frame.
///
/// # Errors
///
/// Returns [`Error::InvalidDimensions`] if either the source or the target
/// has a zero side.
pub fn resize_area(frame: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (src_w, src_h) = frame.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(Error::InvalidDimensions {
            width: src_w,
            height: src_h,
        });
    }
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if (src_w, src_h) == (width, height) {
        return Ok(frame.clone());
    }

    let invalid = |_| Error::InvalidDimensions { width, height };

    // fast_image_resize wants a mutable source slice
    let mut src_buf = frame.as_raw().clone();
    let src_image = Image::from_slice_u8(src_w, src_h, &mut src_buf, PixelType::U8x3).map_err(invalid)?;

    let mut dst_buf = vec![0u8; width as usize * height as usize * 3];
    let mut dst_image = Image::from_slice_u8(width, height, &mut dst_buf, PixelType::U8x3).map_err(invalid)?;

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|_| Error::InvalidDimensions { width, height })?;

    RgbImage::from_raw(width, height, dst_buf).ok_or(Error::InvalidDimensions { width, height })
}

/// Rec. 601 luma, rounded: `0.299 R + 0.587 G + 0.114 B`.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b))
        .round()
        .min(255.0) as u8
}

/// Convert an RGB frame to grayscale.
pub fn to_grayscale(frame: &RgbImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let px = frame.get_pixel(x, y);
        Luma([luma(px[0], px[1], px[2])])
    })
}

/// Convert one frame to a glyph grid `columns` wide.
///
/// The frame is area-resampled to `columns` x [`grid_height`], converted to
/// grayscale, tone mapped, and every intensity is replaced by its LUT glyph.
///
/// # Errors
///
/// Returns [`Error::InvalidDimensions`] when `columns` is 0 or the derived row
/// count is 0, and [`Error::InvalidParameter`] for bad tone parameters.
pub fn frame_to_grid(
    frame: &RgbImage,
    columns: u32,
    compression: f64,
    tone: &ToneParams,
    lut: &GlyphLut,
) -> Result<GlyphGrid> {
    let (src_w, src_h) = frame.dimensions();
    let rows = grid_height(src_w, src_h, columns, compression);
    if columns == 0 || rows == 0 {
        return Err(Error::InvalidDimensions {
            width: columns,
            height: rows,
        });
    }

    let resized = resize_area(frame, columns, rows)?;
    let gray = tone_map(to_grayscale(&resized), tone)?;
    let glyphs = gray.as_raw().iter().map(|&p| lut.glyph(p)).collect();
    GlyphGrid::new(columns, rows, glyphs)
}
