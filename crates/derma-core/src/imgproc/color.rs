//! Color-space conversions on RGB rasters, using 8-bit encodings throughout.

use crate::types::RasterImage;
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::sync::OnceLock;

/// Full hue circle in the 8-bit hue encoding (degrees / 2).
pub const HUE_MAX: u8 = 180;

// CIE constants for the lightness curve.
const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 903.3;

/// sRGB → luminance weights (D65).
const Y_WEIGHTS: [f64; 3] = [0.212671, 0.715160, 0.072169];

/// BT.601 intensity, the weighting the face cascade was trained on.
pub fn to_intensity(image: &RasterImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let v = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Convert one RGB pixel to `[hue, saturation, value]`.
///
/// Hue is degrees / 2 (0..=180), saturation and value span 0..=255.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        (h / 2.0).round().min(HUE_MAX as f32) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// HSV view of an RGB raster; channel 0 is hue, 1 saturation, 2 value.
pub fn to_hsv(image: &RasterImage) -> RgbImage {
    let mut hsv = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(hsv.pixels_mut()) {
        *dst = Rgb(rgb_to_hsv(src.0));
    }
    hsv
}

fn srgb_to_linear_lut() -> &'static [f64; 256] {
    static LUT: OnceLock<[f64; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        std::array::from_fn(|i| {
            let c = i as f64 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        })
    })
}

/// CIE L* of one RGB pixel, scaled from 0..100 to 0..255.
pub fn lightness(rgb: [u8; 3]) -> u8 {
    let lut = srgb_to_linear_lut();
    let y = Y_WEIGHTS[0] * lut[rgb[0] as usize]
        + Y_WEIGHTS[1] * lut[rgb[1] as usize]
        + Y_WEIGHTS[2] * lut[rgb[2] as usize];

    let l = if y > LAB_EPSILON {
        116.0 * y.cbrt() - 16.0
    } else {
        LAB_KAPPA * y
    };
    (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
}

/// Lightness channel of the Lab representation.
pub fn to_lightness(image: &RasterImage) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = Luma([lightness(src.0)]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
    }

    #[test]
    fn test_hsv_gray_has_no_saturation() {
        let [h, s, v] = rgb_to_hsv([128, 128, 128]);
        assert_eq!((h, s, v), (0, 0, 128));
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn test_hsv_wraps_near_red() {
        // Slightly blue-shifted red sits at the top of the hue circle.
        let [h, _, _] = rgb_to_hsv([255, 0, 10]);
        assert!(h >= 170, "hue {h}");
    }

    #[test]
    fn test_lightness_extremes() {
        assert_eq!(lightness([0, 0, 0]), 0);
        assert_eq!(lightness([255, 255, 255]), 255);
    }

    #[test]
    fn test_lightness_mid_gray() {
        // L* of sRGB 128 gray is about 53.6.
        let l = lightness([128, 128, 128]);
        assert!((136..=138).contains(&l), "L = {l}");
    }

    #[test]
    fn test_lightness_is_monotonic_in_gray() {
        let mut prev = 0u8;
        for v in 0..=255u8 {
            let l = lightness([v, v, v]);
            assert!(l >= prev);
            prev = l;
        }
    }

    #[test]
    fn test_intensity_weights() {
        let img = RasterImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let gray = to_intensity(&img);
        assert_eq!(gray.get_pixel(1, 1).0[0], 76);
    }
}
