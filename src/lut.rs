//! Intensity to glyph lookup table.

use crate::error::{Error, Result};

/// Ten glyphs from visually sparse to dense.
pub const DEFAULT_PALETTE: &str = " .:-=+*#%@";

/// 256-entry table mapping an 8-bit intensity to a palette glyph.
///
/// Entry `i` holds `palette[i * (len - 1) / 255]`, so entry 0 is the first
/// palette glyph, entry 255 the last, and the palette index never decreases
/// as the intensity grows.
///
/// # Example
///
/// ```
/// use asciivid::GlyphLut;
///
/// let lut = GlyphLut::new(" .:#@").unwrap();
/// assert_eq!(lut.glyph(0), ' ');
/// assert_eq!(lut.glyph(128), ':');
/// assert_eq!(lut.glyph(255), '@');
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphLut {
    palette: Vec<char>,
    table: [char; 256],
}

impl GlyphLut {
    /// Build the table for `palette`, ordered light to dense.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPalette`] if `palette` is empty.
    pub fn new(palette: &str) -> Result<Self> {
        let palette: Vec<char> = palette.chars().collect();
        if palette.is_empty() {
            return Err(Error::InvalidPalette);
        }
        Ok(Self::from_glyphs(palette))
    }

    // Caller guarantees `palette` is non-empty.
    fn from_glyphs(palette: Vec<char>) -> Self {
        let last = palette.len() - 1;
        let mut table = [' '; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = palette[i * last / 255];
        }
        Self { palette, table }
    }

    /// Glyph for an intensity.
    #[inline]
    pub fn glyph(&self, intensity: u8) -> char {
        self.table[intensity as usize]
    }

    /// The palette the table was built from.
    pub fn palette(&self) -> &[char] {
        &self.palette
    }

    /// All 256 entries, indexed by intensity.
    pub fn entries(&self) -> &[char; 256] {
        &self.table
    }
}

impl Default for GlyphLut {
    fn default() -> Self {
        Self::from_glyphs(DEFAULT_PALETTE.chars().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette_index(lut: &GlyphLut, ch: char) -> usize {
        lut.palette().iter().position(|&c| c == ch).unwrap()
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(matches!(GlyphLut::new(""), Err(Error::InvalidPalette)));
    }

    #[test]
    fn endpoints_map_to_first_and_last_glyph() {
        for palette in [" #", DEFAULT_PALETTE, "ab", " .'`^,:;Il!i><~+_-?][}{1)(|/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$"] {
            let lut = GlyphLut::new(palette).unwrap();
            assert_eq!(lut.glyph(0), palette.chars().next().unwrap());
            assert_eq!(lut.glyph(255), palette.chars().last().unwrap());
        }
    }

    #[test]
    fn palette_index_never_decreases() {
        let lut = GlyphLut::new(DEFAULT_PALETTE).unwrap();
        let indices: Vec<usize> = lut.entries().iter().map(|&c| palette_index(&lut, c)).collect();
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn single_glyph_palette_fills_table() {
        let lut = GlyphLut::new("#").unwrap();
        assert!(lut.entries().iter().all(|&c| c == '#'));
    }

    #[test]
    fn matches_floor_division() {
        let lut = GlyphLut::new(DEFAULT_PALETTE).unwrap();
        // 9 * 28 / 255 = 0, 9 * 29 / 255 = 1
        assert_eq!(lut.glyph(28), ' ');
        assert_eq!(lut.glyph(29), '.');
        assert_eq!(lut.glyph(254), '%');
    }

    #[test]
    fn default_uses_default_palette() {
        assert_eq!(GlyphLut::default(), GlyphLut::new(DEFAULT_PALETTE).unwrap());
    }

    #[test]
    fn multibyte_glyphs_are_single_entries() {
        let lut = GlyphLut::new(" ░▒▓█").unwrap();
        assert_eq!(lut.palette().len(), 5);
        assert_eq!(lut.glyph(255), '█');
    }
}
