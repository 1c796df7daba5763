//! Region-of-interest extraction.

use crate::types::{BoundingBox, RasterImage};
use image::GenericImageView;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoiError {
    #[error("region {width}x{height}+{x}+{y} exceeds image bounds {image_width}x{image_height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Copy the pixels under `bbox` into a new raster.
pub fn crop(image: &RasterImage, bbox: &BoundingBox) -> Result<RasterImage, RoiError> {
    if !bbox.fits_within(image.width(), image.height()) {
        return Err(RoiError::OutOfBounds {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
            image_width: image.width(),
            image_height: image.height(),
        });
    }
    Ok(image
        .view(bbox.x, bbox.y, bbox.width, bbox.height)
        .to_image())
}
