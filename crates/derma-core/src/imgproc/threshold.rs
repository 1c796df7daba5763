//! Binary masks from thresholds. Foreground is 255, background 0.

use image::{GrayImage, Luma, RgbImage};

pub const FOREGROUND: u8 = 255;

/// Otsu's threshold: the level that maximizes between-class variance when
/// pixels `<= level` form one class and pixels `> level` the other.
///
/// Returns 0 when no level splits the image into two non-empty classes.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.as_raw() {
        hist[*p as usize] += 1;
    }

    let total: u64 = hist.iter().sum();
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut w0 = 0u64;
    let mut sum0 = 0.0f64;
    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;

    for (level, &count) in hist.iter().enumerate() {
        w0 += count;
        sum0 += level as f64 * count as f64;
        if w0 == 0 {
            continue;
        }
        let w1 = total - w0;
        if w1 == 0 {
            break;
        }

        let m0 = sum0 / w0 as f64;
        let m1 = (sum_total - sum0) / w1 as f64;
        let variance = w0 as f64 * w1 as f64 * (m0 - m1).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}

/// Mask of pixels at or below `level` (dark pixels become foreground).
pub fn threshold_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] <= level {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Mask of pixels whose three channels all lie in `lower..=upper`.
pub fn in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y).0;
        let inside = (0..3).all(|c| px[c] >= lower[c] && px[c] <= upper[c]);
        Luma([if inside { FOREGROUND } else { 0 }])
    })
}

/// Pixelwise OR of two masks of equal size.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0] | b.get_pixel(x, y).0[0]])
    })
}

/// Number of foreground pixels.
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&p| p != 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_otsu_bimodal() {
        let gray = GrayImage::from_fn(20, 10, |x, _| Luma([if x < 10 { 40 } else { 200 }]));
        let level = otsu_level(&gray);
        assert!((40..200).contains(&level), "level {level}");

        let dark = threshold_inverted(&gray, level);
        assert_eq!(count_foreground(&dark), 100);
        assert_eq!(dark.get_pixel(0, 0).0[0], FOREGROUND);
        assert_eq!(dark.get_pixel(19, 9).0[0], 0);
    }

    #[test]
    fn test_otsu_uniform_is_zero() {
        let gray = GrayImage::from_pixel(8, 8, Luma([137]));
        assert_eq!(otsu_level(&gray), 0);
        assert_eq!(count_foreground(&threshold_inverted(&gray, 0)), 0);
    }

    #[test]
    fn test_otsu_empty_image() {
        assert_eq!(otsu_level(&GrayImage::new(0, 0)), 0);
    }

    #[test]
    fn test_in_range_inclusive() {
        let img = RgbImage::from_fn(3, 1, |x, _| Rgb([x as u8 * 5, 100, 100]));
        let mask = in_range(&img, [0, 50, 50], [5, 255, 255]);
        assert_eq!(mask.as_raw(), &vec![FOREGROUND, FOREGROUND, 0]);
    }

    #[test]
    fn test_union() {
        let a = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 255 } else { 0 }]));
        let b = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 1 { 255 } else { 0 }]));
        assert_eq!(count_foreground(&union(&a, &b)), 2);
    }
}
