//! Transport codec: base64 (optionally a data URI) ⇄ in-memory raster.

use crate::types::RasterImage;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Strip a `data:<mime>;base64,` marker if present.
fn strip_data_uri(payload: &str) -> &str {
    let payload = payload.trim();
    match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
}

/// Decode a base64 (or data URI) image into an RGB raster. Line breaks and
/// other ASCII whitespace inside the body are skipped, so wrapped (MIME
/// style) base64 decodes too.
pub fn decode_image(payload: &str) -> Result<RasterImage, CodecError> {
    let body = strip_data_uri(payload);
    let bytes = if body.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = body.split_ascii_whitespace().collect();
        STANDARD.decode(compact)?
    } else {
        STANDARD.decode(body)?
    };
    decode_bytes(&bytes)
}

/// Decode raw compressed image bytes (JPEG, PNG, ...) into an RGB raster.
pub fn decode_bytes(bytes: &[u8]) -> Result<RasterImage, CodecError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CodecError::ZeroDimensions);
    }
    Ok(decoded.to_rgb8())
}

/// Encode a raster as JPEG and wrap it in a `data:image/jpeg;base64,` URI.
pub fn encode_image(image: &RasterImage, quality: u8) -> Result<String, CodecError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CodecError::ZeroDimensions);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    Ok(format!("{JPEG_DATA_URI_PREFIX}{}", STANDARD.encode(&jpeg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_base64(width: u32, height: u32) -> String {
        let img = RasterImage::from_pixel(width, height, Rgb([120, 80, 60]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn test_decode_plain_base64() {
        let img = decode_image(&png_base64(7, 5)).unwrap();
        assert_eq!(img.dimensions(), (7, 5));
        assert_eq!(img.get_pixel(3, 2), &Rgb([120, 80, 60]));
    }

    #[test]
    fn test_decode_strips_data_uri() {
        let payload = format!("data:image/png;base64,{}", png_base64(4, 4));
        let img = decode_image(&payload).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_decode_accepts_wrapped_base64() {
        let flat = png_base64(64, 64);
        let wrapped = flat
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));

        let img = decode_image(&wrapped).unwrap();
        assert_eq!(img.dimensions(), (64, 64));
        let uri = format!("data:image/png;base64,\n{wrapped}\n");
        assert_eq!(decode_image(&uri).unwrap().dimensions(), (64, 64));
    }

    #[test]
    fn test_decode_rejects_garbage_base64() {
        let err = decode_image("not base64 at all!!").unwrap_err();
        assert!(matches!(err, CodecError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let payload = STANDARD.encode(b"definitely not an image");
        let err = decode_image(&payload).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_roundtrip_preserves_dimensions() {
        let img = RasterImage::from_fn(33, 17, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, 90]));
        let encoded = encode_image(&img, DEFAULT_JPEG_QUALITY).unwrap();
        assert!(encoded.starts_with(JPEG_DATA_URI_PREFIX));

        let decoded = decode_image(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), img.dimensions());
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let img = RasterImage::new(0, 0);
        assert!(matches!(
            encode_image(&img, 80),
            Err(CodecError::ZeroDimensions)
        ));
    }
}
