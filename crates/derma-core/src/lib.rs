//! derma-core: facial skin analysis.
//!
//! Locates a face with a Haar cascade, finds redness and dark spots inside
//! it, scores the skin, and renders an annotated copy of the input. Pure and
//! synchronous; the caller decides how to schedule it.

pub mod annotate;
pub mod cascade;
pub mod codec;
pub mod defects;
pub mod imgproc;
pub mod locator;
pub mod pipeline;
pub mod progress;
pub mod recommend;
pub mod roi;
pub mod scorer;
pub mod types;

pub use cascade::{CascadeError, HaarCascade, ScanParams};
pub use defects::{DefectDetector, DetectionParams};
pub use locator::{CascadeLocator, FaceLocator, FaceSelection};
pub use pipeline::{AnalysisError, AnalysisReport, AnalyzerOptions, SkinAnalyzer};
pub use types::{AnalysisResult, BoundingBox, DefectKind, DefectRegion, RasterImage, Severity};

use std::path::PathBuf;

/// File name of OpenCV's frontal face cascade inside the model directory.
pub const FRONTAL_FACE_CASCADE: &str = "haarcascade_frontalface_default.xml";

/// `$XDG_DATA_HOME/derma/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("derma")
        .join("models")
}
