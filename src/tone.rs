//! Grayscale tone mapping: brightness/contrast, gamma, histogram equalization.

use image::GrayImage;

use crate::error::{Error, Result};

/// Gamma applied when none is configured.
pub const DEFAULT_GAMMA: f64 = 0.4;

/// Tone mapping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    /// Additive offset applied before gamma.
    pub brightness: f64,
    /// Contrast offset; the gain is `contrast / 127 + 1`.
    pub contrast: f64,
    /// Gamma exponent, strictly positive.
    pub gamma: f64,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 0.0,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl ToneParams {
    /// Check that gamma is positive and every value is finite.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(Error::parameter("gamma", format!("must be > 0, got {}", self.gamma)));
        }
        if !self.brightness.is_finite() {
            return Err(Error::parameter("brightness", "must be finite"));
        }
        if !self.contrast.is_finite() {
            return Err(Error::parameter("contrast", "must be finite"));
        }
        Ok(())
    }
}

/// Apply `out = clamp(in * alpha + beta)` with `alpha = contrast / 127 + 1`
/// and `beta = brightness`.
pub fn adjust_brightness_contrast(gray: &mut GrayImage, brightness: f64, contrast: f64) {
    let alpha = contrast / 127.0 + 1.0;
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = (i as f64 * alpha + brightness).round().clamp(0.0, 255.0) as u8;
    }
    apply_table(gray, &table);
}

/// Gamma correction table: `round((i / 255) ^ (1 / gamma) * 255)`.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `gamma` is not strictly positive.
pub fn gamma_table(gamma: f64) -> Result<[u8; 256]> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(Error::parameter("gamma", format!("must be > 0, got {gamma}")));
    }
    let inv_gamma = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as f64 / 255.0).powf(inv_gamma) * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    Ok(table)
}

/// Gamma-correct every pixel in place.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `gamma` is not strictly positive.
pub fn apply_gamma(gray: &mut GrayImage, gamma: f64) -> Result<()> {
    let table = gamma_table(gamma)?;
    apply_table(gray, &table);
    Ok(())
}

/// Spread intensities using the image's own cumulative histogram.
///
/// The lowest occupied bin maps to 0 and the highest to 255. An image with a
/// single intensity is left unchanged.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let mut hist = [0u64; 256];
    for p in gray.as_raw() {
        hist[*p as usize] += 1;
    }

    let total: u64 = hist.iter().sum();
    let Some(first) = hist.iter().position(|&n| n > 0) else {
        return;
    };
    if hist[first] == total {
        return;
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut table = [0u8; 256];
    let mut cumulative = 0u64;
    for i in (first + 1)..256 {
        cumulative += hist[i];
        table[i] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    apply_table(gray, &table);
}

/// Run the full tone chain: brightness/contrast, gamma, equalization.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `params` does not validate; the
/// image is not touched in that case.
pub fn tone_map(mut gray: GrayImage, params: &ToneParams) -> Result<GrayImage> {
    params.validate()?;
    adjust_brightness_contrast(&mut gray, params.brightness, params.contrast);
    apply_gamma(&mut gray, params.gamma)?;
    equalize_histogram(&mut gray);
    Ok(gray)
}

fn apply_table(gray: &mut GrayImage, table: &[u8; 256]) {
    for p in gray.iter_mut() {
        *p = table[*p as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(256, 4, |x, _| Luma([x as u8]))
    }

    #[test]
    fn non_positive_gamma_is_rejected() {
        assert!(matches!(gamma_table(0.0), Err(Error::InvalidParameter { name: "gamma", .. })));
        assert!(gamma_table(-1.0).is_err());
        assert!(gamma_table(f64::NAN).is_err());
    }

    #[test]
    fn unit_gamma_is_identity() {
        let table = gamma_table(1.0).unwrap();
        for (i, v) in table.iter().enumerate() {
            assert_eq!(*v as usize, i);
        }
    }

    #[test]
    fn gamma_below_one_darkens_midtones() {
        let table = gamma_table(DEFAULT_GAMMA).unwrap();
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        assert!(table[128] < 128);
        let table = gamma_table(2.0).unwrap();
        assert!(table[128] > 128);
    }

    #[test]
    fn brightness_and_contrast_clamp() {
        let mut img = GrayImage::from_raw(3, 1, vec![0, 100, 250]).unwrap();
        adjust_brightness_contrast(&mut img, 10.0, 0.0);
        assert_eq!(img.as_raw(), &vec![10, 110, 255]);

        let mut img = GrayImage::from_raw(2, 1, vec![50, 200]).unwrap();
        adjust_brightness_contrast(&mut img, 0.0, 127.0);
        assert_eq!(img.as_raw(), &vec![100, 255]);
    }

    #[test]
    fn equalizing_uniform_gradient_is_fixed_point() {
        let params = ToneParams {
            brightness: 0.0,
            contrast: 0.0,
            gamma: 1.0,
        };
        let once = tone_map(gradient(), &params).unwrap();
        let mut twice = once.clone();
        equalize_histogram(&mut twice);
        let max_diff = once
            .as_raw()
            .iter()
            .zip(twice.as_raw())
            .map(|(a, b)| (*a as i16 - *b as i16).abs())
            .max()
            .unwrap();
        assert!(max_diff <= 1, "max diff {max_diff}");
        assert_eq!(once.as_raw(), gradient().as_raw());
    }

    #[test]
    fn equalization_stretches_narrow_range() {
        let mut img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8]));
        equalize_histogram(&mut img);
        assert_eq!(img.as_raw(), &vec![0, 85, 170, 255]);
    }

    #[test]
    fn constant_image_survives_equalization() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([42]));
        equalize_histogram(&mut img);
        assert!(img.pixels().all(|p| p[0] == 42));
    }

    #[test]
    fn tone_map_keeps_dimensions() {
        let out = tone_map(GrayImage::new(7, 3), &ToneParams::default()).unwrap();
        assert_eq!(out.dimensions(), (7, 3));
    }

    #[test]
    fn tone_map_rejects_bad_gamma_before_touching_pixels() {
        let params = ToneParams {
            gamma: 0.0,
            ..ToneParams::default()
        };
        assert!(tone_map(gradient(), &params).is_err());
    }
}
