//! Analysis orchestration: decode, find a face, crop, detect, score,
//! recommend, annotate, encode.
//!
//! Each stage returns a `Result`; `SkinAnalyzer::analyze` is the only place
//! errors (and panics) are flattened into the `{success: false, error}` shape
//! callers see.

use crate::annotate::annotate;
use crate::codec::{self, CodecError, DEFAULT_JPEG_QUALITY};
use crate::defects::DefectDetector;
use crate::locator::{FaceLocator, FaceSelection};
use crate::recommend::recommend;
use crate::roi::{self, RoiError};
use crate::scorer::score;
use crate::types::{AnalysisResult, BoundingBox, DefectRegion, RasterImage};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid image data: {0}")]
    Decode(#[source] CodecError),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error(transparent)]
    OutOfBounds(#[from] RoiError),
    #[error("could not encode annotated image: {0}")]
    Encode(#[source] CodecError),
    #[error("analysis failed: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerOptions {
    pub face_selection: FaceSelection,
    /// JPEG quality (1–100) for the annotated image.
    pub jpeg_quality: u8,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            face_selection: FaceSelection::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedIssues {
    pub redness_count: usize,
    pub dark_spots_count: usize,
}

/// Successful analysis, in the shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub skin_score: f64,
    pub detected_issues: DetectedIssues,
    pub redness_areas: Vec<DefectRegion>,
    pub dark_spot_areas: Vec<DefectRegion>,
    pub recommendations: Vec<String>,
    /// Data URI of the annotated JPEG.
    pub annotated_image: String,
    pub face_location: BoundingBox,
}

impl AnalysisPayload {
    fn new(result: AnalysisResult, annotated_image: String) -> Self {
        Self {
            skin_score: result.skin_score,
            detected_issues: DetectedIssues {
                redness_count: result.redness_regions.len(),
                dark_spots_count: result.dark_spot_regions.len(),
            },
            redness_areas: result.redness_regions,
            dark_spot_areas: result.dark_spot_regions,
            recommendations: result.recommendations,
            annotated_image,
            face_location: result.face_box,
        }
    }
}

/// The outward result of one analysis. On success the payload fields sit
/// beside `success`; on failure only `success` and `error` are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Option<AnalysisPayload>,
}

impl AnalysisReport {
    pub fn succeeded(payload: AnalysisPayload) -> Self {
        Self {
            success: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            payload: None,
        }
    }
}

/// Runs the full analysis. Holds only read-only state, so one instance can be
/// shared across worker threads.
pub struct SkinAnalyzer {
    locator: Arc<dyn FaceLocator>,
    detector: DefectDetector,
    options: AnalyzerOptions,
}

impl SkinAnalyzer {
    pub fn new(locator: Arc<dyn FaceLocator>) -> Self {
        Self {
            locator,
            detector: DefectDetector::default(),
            options: AnalyzerOptions::default(),
        }
    }

    pub fn with_detector(mut self, detector: DefectDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Analyze an encoded image. Never panics and never returns an error:
    /// every failure becomes `success: false` with a display message.
    pub fn analyze(&self, image_data: &str) -> AnalysisReport {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_analyze(image_data)));

        let err = match outcome {
            Ok(Ok(payload)) => return AnalysisReport::succeeded(payload),
            Ok(Err(err)) => err,
            Err(panic) => AnalysisError::Unexpected(panic_message(panic.as_ref())),
        };

        match &err {
            AnalysisError::NoFaceDetected => tracing::info!("no face detected"),
            other => tracing::warn!(error = %other, "analysis failed"),
        }
        AnalysisReport::failed(err.to_string())
    }

    /// Decode, analyze and re-encode, keeping error kinds distinct.
    pub fn try_analyze(&self, image_data: &str) -> Result<AnalysisPayload, AnalysisError> {
        let image = codec::decode_image(image_data).map_err(AnalysisError::Decode)?;
        let result = self.analyze_image(&image)?;
        let encoded = codec::encode_image(&result.annotated_image, self.options.jpeg_quality)
            .map_err(AnalysisError::Encode)?;
        Ok(AnalysisPayload::new(result, encoded))
    }

    /// The raster-level pipeline, from face search through annotation.
    pub fn analyze_image(&self, image: &RasterImage) -> Result<AnalysisResult, AnalysisError> {
        let faces = self.locator.locate_faces(image);
        let face_box = self
            .options
            .face_selection
            .select(&faces)
            .ok_or(AnalysisError::NoFaceDetected)?;
        tracing::debug!(
            candidates = faces.len(),
            x = face_box.x,
            y = face_box.y,
            width = face_box.width,
            height = face_box.height,
            "face selected"
        );

        let face = roi::crop(image, &face_box)?;
        let found = self.detector.detect(&face);

        let skin_score = score(&found.redness, &found.dark_spots);
        let recommendations = recommend(found.redness.len(), found.dark_spots.len(), skin_score);
        let annotated_image = annotate(
            image,
            &face_box,
            &found.redness,
            &found.dark_spots,
            skin_score,
        );

        tracing::info!(
            skin_score,
            redness = found.redness.len(),
            dark_spots = found.dark_spots.len(),
            "analysis complete"
        );

        Ok(AnalysisResult {
            skin_score,
            redness_regions: found.redness,
            dark_spot_regions: found.dark_spots,
            recommendations,
            annotated_image,
            face_box,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    }
}
