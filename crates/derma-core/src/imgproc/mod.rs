//! Small image-algorithm toolkit used by the locator and the defect detector:
//! color conversions, thresholding, binary morphology and contour extraction.

pub mod color;
pub mod contours;
pub mod morphology;
pub mod threshold;

pub use contours::{find_outer_blobs, Blob};
