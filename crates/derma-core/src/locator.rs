//! Face location: the `FaceLocator` seam, the cascade-backed locator, and the
//! policy for choosing one face when several are found.

use crate::cascade::{HaarCascade, ScanParams};
use crate::imgproc::color;
use crate::types::{BoundingBox, RasterImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Pluggable face locator.
///
/// Returns every face-like box in scan order, each inside the image bounds.
/// An empty result means "no face", never a failure.
pub trait FaceLocator: Send + Sync {
    fn locate_faces(&self, image: &RasterImage) -> Vec<BoundingBox>;
}

/// Locator backed by a shared, read-only Haar cascade.
pub struct CascadeLocator {
    cascade: Arc<HaarCascade>,
    params: ScanParams,
}

impl CascadeLocator {
    pub fn new(cascade: Arc<HaarCascade>, params: ScanParams) -> Self {
        Self { cascade, params }
    }
}

impl FaceLocator for CascadeLocator {
    fn locate_faces(&self, image: &RasterImage) -> Vec<BoundingBox> {
        let gray = color::to_intensity(image);
        let faces = self.cascade.detect(&gray, &self.params);
        tracing::debug!(count = faces.len(), "faces located");
        faces
    }
}

/// Which face to analyze when the locator reports several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceSelection {
    /// First box in scan order (reference behavior).
    #[default]
    First,
    /// Largest box by area; the earliest wins ties.
    Largest,
}

impl FaceSelection {
    pub fn select(self, faces: &[BoundingBox]) -> Option<BoundingBox> {
        match self {
            FaceSelection::First => faces.first().copied(),
            FaceSelection::Largest => faces
                .iter()
                .copied()
                .reduce(|best, b| if b.area() > best.area() { b } else { best }),
        }
    }
}

impl FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(FaceSelection::First),
            "largest" => Ok(FaceSelection::Largest),
            other => Err(format!("unknown face selection policy: {other}")),
        }
    }
}
