//! Redness and dark-spot detection over a face ROI.
//!
//! Redness: HSV hue near red with enough saturation and value, closed then
//! opened with a 5×5 square, outer components larger than the noise floor.
//!
//! Dark spots: Lab lightness thresholded with Otsu's level and inverted,
//! closed with a 3×3 square, outer components in a size band that are round
//! enough to be pigmentation rather than shadow or hair.

use crate::imgproc::{color, find_outer_blobs, morphology, threshold, Blob};
use crate::types::{DefectKind, DefectRegion, RasterImage, Severity};

/// Tunables for both detection pipelines. Defaults are the calibrated values.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    /// Inclusive 8-bit hue bands treated as red (hue = degrees / 2).
    pub red_hue_bands: [(u8, u8); 2],
    pub min_saturation: u8,
    pub min_value: u8,
    /// Square kernel radius for redness closing and opening (2 → 5×5).
    pub redness_kernel_radius: u32,
    /// Redness components must be strictly larger than this many pixels.
    pub redness_min_area: u32,
    /// Square kernel radius for dark-spot closing (1 → 3×3).
    pub dark_spot_kernel_radius: u32,
    /// Dark spots must be strictly larger than this many pixels...
    pub dark_spot_min_area: u32,
    /// ...and strictly smaller than this many.
    pub dark_spot_max_area: u32,
    /// Dark spots must be strictly rounder than this.
    pub dark_spot_min_circularity: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            red_hue_bands: [(0, 10), (170, color::HUE_MAX)],
            min_saturation: 50,
            min_value: 50,
            redness_kernel_radius: 2,
            redness_min_area: 100,
            dark_spot_kernel_radius: 1,
            dark_spot_min_area: 50,
            dark_spot_max_area: 5000,
            dark_spot_min_circularity: 0.4,
        }
    }
}

/// Regions found in one ROI, in ROI coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    pub redness: Vec<DefectRegion>,
    pub dark_spots: Vec<DefectRegion>,
}

#[derive(Debug, Clone, Default)]
pub struct DefectDetector {
    params: DetectionParams,
}

impl DefectDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Run both pipelines over `roi`.
    pub fn detect(&self, roi: &RasterImage) -> Detections {
        let detections = Detections {
            redness: self.detect_redness(roi),
            dark_spots: self.detect_dark_spots(roi),
        };
        tracing::debug!(
            width = roi.width(),
            height = roi.height(),
            redness = detections.redness.len(),
            dark_spots = detections.dark_spots.len(),
            "defect detection complete"
        );
        detections
    }

    pub fn detect_redness(&self, roi: &RasterImage) -> Vec<DefectRegion> {
        let p = &self.params;
        let hsv = color::to_hsv(roi);

        let [(lo1, hi1), (lo2, hi2)] = p.red_hue_bands;
        let mask = threshold::union(
            &threshold::in_range(&hsv, [lo1, p.min_saturation, p.min_value], [hi1, 255, 255]),
            &threshold::in_range(&hsv, [lo2, p.min_saturation, p.min_value], [hi2, 255, 255]),
        );
        let mask = morphology::close(&mask, p.redness_kernel_radius);
        let mask = morphology::open(&mask, p.redness_kernel_radius);

        find_outer_blobs(&mask)
            .into_iter()
            .filter(|blob| blob.area > p.redness_min_area)
            .map(|blob| region_from_blob(&blob, DefectKind::Redness, roi, None))
            .collect()
    }

    pub fn detect_dark_spots(&self, roi: &RasterImage) -> Vec<DefectRegion> {
        let p = &self.params;
        let lightness = color::to_lightness(roi);
        let level = threshold::otsu_level(&lightness);
        let mask = threshold::threshold_inverted(&lightness, level);
        let mask = morphology::close(&mask, p.dark_spot_kernel_radius);

        find_outer_blobs(&mask)
            .into_iter()
            .filter(|blob| blob.area > p.dark_spot_min_area && blob.area < p.dark_spot_max_area)
            .filter_map(|blob| {
                let circularity = blob.circularity();
                (circularity > p.dark_spot_min_circularity)
                    .then(|| region_from_blob(&blob, DefectKind::DarkSpot, roi, Some(circularity)))
            })
            .collect()
    }
}

fn region_from_blob(
    blob: &Blob,
    kind: DefectKind,
    roi: &RasterImage,
    circularity: Option<f64>,
) -> DefectRegion {
    DefectRegion {
        x: blob.bbox.x,
        y: blob.bbox.y,
        width: blob.bbox.width,
        height: blob.bbox.height,
        area: blob.area,
        severity: Severity::classify(blob.area, roi.width(), roi.height()),
        kind,
        circularity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

    fn paint_rect(img: &mut RasterImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, color);
            }
        }
    }

    #[test]
    fn test_uniform_gray_has_no_defects() {
        let roi = RasterImage::from_pixel(120, 120, GRAY);
        let found = DefectDetector::default().detect(&roi);
        assert!(found.redness.is_empty());
        assert!(found.dark_spots.is_empty());
    }

    #[test]
    fn test_single_red_patch() {
        let mut roi = RasterImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        paint_rect(&mut roi, 20, 30, 12, 12, Rgb([230, 40, 40]));
        let redness = DefectDetector::default().detect_redness(&roi);
        assert_eq!(redness.len(), 1);
        let r = &redness[0];
        assert_eq!((r.x, r.y, r.width, r.height, r.area), (20, 30, 12, 12, 144));
        assert_eq!(r.kind, DefectKind::Redness);
        // 144 / 10_000 = 0.0144
        assert_eq!(r.severity, Severity::Severe);
        assert!(r.circularity.is_none());
    }

    #[test]
    fn test_redness_noise_floor() {
        // 10×10 = 100 pixels is not strictly above the floor.
        let mut roi = RasterImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        paint_rect(&mut roi, 40, 40, 10, 10, Rgb([230, 40, 40]));
        assert!(DefectDetector::default().detect_redness(&roi).is_empty());
    }

    #[test]
    fn test_redness_wraparound_hue() {
        // Magenta-leaning red: hue near the top of the circle.
        let mut roi = RasterImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        paint_rect(&mut roi, 10, 10, 15, 15, Rgb([220, 30, 60]));
        assert_eq!(DefectDetector::default().detect_redness(&roi).len(), 1);
    }

    #[test]
    fn test_dark_red_is_not_redness() {
        // Value below the floor excludes near-black reds.
        let mut roi = RasterImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        paint_rect(&mut roi, 10, 10, 20, 20, Rgb([40, 5, 5]));
        assert!(DefectDetector::default().detect_redness(&roi).is_empty());
    }

    #[test]
    fn test_round_dark_spot_detected() {
        let mut roi = RasterImage::from_pixel(200, 200, Rgb([190, 180, 175]));
        for y in 0..200u32 {
            for x in 0..200u32 {
                let (dx, dy) = (x as i64 - 100, y as i64 - 100);
                if dx * dx + dy * dy <= 25 {
                    roi.put_pixel(x, y, Rgb([50, 40, 35]));
                }
            }
        }
        let spots = DefectDetector::default().detect_dark_spots(&roi);
        assert_eq!(spots.len(), 1);
        let s = &spots[0];
        assert_eq!(s.area, 81);
        assert_eq!((s.x, s.y, s.width, s.height), (95, 95, 11, 11));
        assert!(s.circularity.unwrap() > 0.4);
        assert_eq!(s.kind, DefectKind::DarkSpot);
    }

    #[test]
    fn test_elongated_dark_streak_rejected() {
        // 2×40 streak: area passes the size band, circularity does not.
        let mut roi = RasterImage::from_pixel(200, 200, Rgb([190, 180, 175]));
        paint_rect(&mut roi, 50, 100, 40, 2, Rgb([40, 40, 40]));
        assert!(DefectDetector::default().detect_dark_spots(&roi).is_empty());
    }

    #[test]
    fn test_large_dark_region_rejected() {
        let mut roi = RasterImage::from_pixel(200, 200, Rgb([190, 180, 175]));
        paint_rect(&mut roi, 20, 20, 100, 100, Rgb([40, 40, 40]));
        assert!(DefectDetector::default().detect_dark_spots(&roi).is_empty());
    }

    #[test]
    fn test_custom_params_respected() {
        let mut roi = RasterImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        paint_rect(&mut roi, 40, 40, 10, 10, Rgb([230, 40, 40]));
        let detector = DefectDetector::new(DetectionParams {
            redness_min_area: 50,
            ..Default::default()
        });
        assert_eq!(detector.detect_redness(&roi).len(), 1);
    }
}
