use serde::{Deserialize, Serialize};

/// Three-channel 8-bit raster, row-major RGB.
pub type RasterImage = image::RgbImage;

/// Axis-aligned box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Box covering a whole `width` × `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if the box is non-empty and lies inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Kind of skin defect a region was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    Redness,
    DarkSpot,
}

impl DefectKind {
    /// Points subtracted from the skin score for one region of this kind.
    pub fn penalty(self, severity: Severity) -> f64 {
        match (self, severity) {
            (DefectKind::Redness, Severity::Mild) => 2.0,
            (DefectKind::Redness, Severity::Moderate) => 5.0,
            (DefectKind::Redness, Severity::Severe) => 10.0,
            (DefectKind::DarkSpot, Severity::Mild) => 1.0,
            (DefectKind::DarkSpot, Severity::Moderate) => 3.0,
            (DefectKind::DarkSpot, Severity::Severe) => 5.0,
        }
    }
}

/// Severity bucket, a step function of region area over ROI area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

const MODERATE_RATIO: f64 = 0.001;
const SEVERE_RATIO: f64 = 0.005;

impl Severity {
    /// Classify a region of `area` pixels found in a `roi_width` × `roi_height` ROI.
    ///
    /// `ratio < 0.001` is mild, `0.001 <= ratio < 0.005` moderate, anything
    /// above severe. A degenerate ROI classifies everything as severe.
    pub fn classify(area: u32, roi_width: u32, roi_height: u32) -> Self {
        let roi_area = roi_width as f64 * roi_height as f64;
        if roi_area <= 0.0 {
            return Severity::Severe;
        }
        Self::from_ratio(area as f64 / roi_area)
    }

    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < MODERATE_RATIO {
            Severity::Mild
        } else if ratio < SEVERE_RATIO {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }
}

/// A localized defect. Coordinates are relative to the ROI it was found in;
/// add the face box offset to get image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Pixel count of the connected region, not the box area.
    pub area: u32,
    pub severity: Severity,
    pub kind: DefectKind,
    /// `4π·area / perimeter²`; only computed for dark spots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circularity: Option<f64>,
}

impl DefectRegion {
    /// Shift the region from ROI coordinates into the coordinates of the
    /// image the ROI was cropped from.
    pub fn offset_by(&self, face: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            face.x + self.x,
            face.y + self.y,
            self.width,
            self.height,
        )
    }
}

/// Everything one analysis produces. Built once at the end of the pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub skin_score: f64,
    pub redness_regions: Vec<DefectRegion>,
    pub dark_spot_regions: Vec<DefectRegion>,
    pub recommendations: Vec<String>,
    pub annotated_image: RasterImage,
    pub face_box: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_boundaries() {
        // 100 / 100_000 = 0.001 exactly → moderate
        assert_eq!(Severity::classify(100, 1000, 100), Severity::Moderate);
        // 500 / 100_000 = 0.005 exactly → severe
        assert_eq!(Severity::classify(500, 1000, 100), Severity::Severe);
        assert_eq!(Severity::classify(99, 1000, 100), Severity::Mild);
        assert_eq!(Severity::classify(499, 1000, 100), Severity::Moderate);
    }

    #[test]
    fn test_severity_step_function() {
        assert_eq!(Severity::from_ratio(0.0), Severity::Mild);
        assert_eq!(Severity::from_ratio(0.000_999), Severity::Mild);
        assert_eq!(Severity::from_ratio(0.003), Severity::Moderate);
        assert_eq!(Severity::from_ratio(0.9), Severity::Severe);
    }

    #[test]
    fn test_severity_degenerate_roi() {
        assert_eq!(Severity::classify(1, 0, 10), Severity::Severe);
    }

    #[test]
    fn test_penalties() {
        assert_eq!(DefectKind::Redness.penalty(Severity::Severe), 10.0);
        assert_eq!(DefectKind::DarkSpot.penalty(Severity::Moderate), 3.0);
    }

    #[test]
    fn test_bbox_fits_within() {
        assert!(BoundingBox::new(0, 0, 10, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(1, 0, 10, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(0, 0, 0, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(u32::MAX, 0, 2, 2).fits_within(10, 10));
    }

    #[test]
    fn test_region_offset() {
        let region = DefectRegion {
            x: 5,
            y: 7,
            width: 3,
            height: 4,
            area: 10,
            severity: Severity::Mild,
            kind: DefectKind::Redness,
            circularity: None,
        };
        let face = BoundingBox::new(100, 200, 50, 50);
        assert_eq!(region.offset_by(&face), BoundingBox::new(105, 207, 3, 4));
    }

    #[test]
    fn test_region_serialization() {
        let region = DefectRegion {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
            area: 9,
            severity: Severity::Moderate,
            kind: DefectKind::DarkSpot,
            circularity: Some(0.8),
        };
        let json = serde_json::to_value(&region).unwrap();
        assert_eq!(json["severity"], "moderate");
        assert_eq!(json["kind"], "dark_spot");
        assert_eq!(json["circularity"], 0.8);
    }
}
