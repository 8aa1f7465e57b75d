//! Per-pixel brightness.
//!
//! Brightness is ITU-R BT.601 luma computed directly on the stored
//! 8-bit channel values: `0.299*R + 0.587*G + 0.114*B`. There is no
//! gamma handling and alpha is ignored.

use image::Rgba;

use crate::types::PixelBuffer;

/// Red channel weight.
pub const RED_WEIGHT: f64 = 0.299;
/// Green channel weight.
pub const GREEN_WEIGHT: f64 = 0.587;
/// Blue channel weight.
pub const BLUE_WEIGHT: f64 = 0.114;

/// Brightness of one pixel, in `[0, 255]`.
///
/// Evaluated as three products summed left to right; a fused
/// multiply-add would round differently and shift pixels that sit
/// exactly on a threshold.
#[must_use]
#[allow(clippy::suboptimal_flops)]
pub fn luminosity(r: u8, g: u8, b: u8) -> f64 {
    RED_WEIGHT * f64::from(r) + GREEN_WEIGHT * f64::from(g) + BLUE_WEIGHT * f64::from(b)
}

/// Brightness of an RGBA pixel (alpha ignored).
#[must_use]
pub fn pixel_luminosity(pixel: &Rgba<u8>) -> f64 {
    let [r, g, b, _] = pixel.0;
    luminosity(r, g, b)
}

/// Brightness of every pixel in row-major order.
#[must_use]
pub fn brightness_samples(image: &PixelBuffer) -> Vec<f64> {
    image
        .pixels()
        .map(|[r, g, b, _]| luminosity(r, g, b))
        .collect()
}

/// Quantize a brightness value to a grey channel byte.
///
/// Rounds half away from zero, then clamps to `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_gray(l: f64) -> u8 {
    l.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn black_is_zero() {
        assert!(luminosity(0, 0, 0).abs() < TOLERANCE);
    }

    #[test]
    fn white_is_full_scale() {
        assert!((luminosity(255, 255, 255) - 255.0).abs() < TOLERANCE);
    }

    #[test]
    fn matches_weighted_formula_across_grid() {
        for r in (0..=255u8).step_by(17) {
            for g in (0..=255u8).step_by(15) {
                for b in (0..=255u8).step_by(51) {
                    let expected = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
                    assert!(
                        (luminosity(r, g, b) - expected).abs() < TOLERANCE,
                        "L({r},{g},{b}) mismatch",
                    );
                }
            }
        }
    }

    #[test]
    fn green_outweighs_red_outweighs_blue() {
        let r = luminosity(255, 0, 0);
        let g = luminosity(0, 255, 0);
        let b = luminosity(0, 0, 255);
        assert!(g > r && r > b, "expected G > R > B, got R={r} G={g} B={b}");
    }

    #[test]
    fn alpha_is_ignored() {
        let opaque = pixel_luminosity(&Rgba([10, 200, 30, 255]));
        let transparent = pixel_luminosity(&Rgba([10, 200, 30, 0]));
        assert!((opaque - transparent).abs() < f64::EPSILON);
    }

    #[test]
    fn samples_are_row_major() {
        let image = PixelBuffer::from_raw(
            2,
            1,
            vec![255, 255, 255, 255, 0, 0, 0, 255],
        )
        .unwrap();
        let samples = brightness_samples(&image);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 255.0).abs() < TOLERANCE);
        assert!(samples[1].abs() < TOLERANCE);
    }

    #[test]
    fn to_gray_rounds_and_clamps() {
        assert_eq!(to_gray(0.0), 0);
        assert_eq!(to_gray(127.5), 128);
        assert_eq!(to_gray(127.49), 127);
        assert_eq!(to_gray(254.999_999_999_999_97), 255);
        assert_eq!(to_gray(300.0), 255);
        assert_eq!(to_gray(-3.0), 0);
    }
}
