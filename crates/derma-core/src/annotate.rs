//! Overlay the analysis on a copy of the source image.

use crate::types::{BoundingBox, DefectRegion, RasterImage};
use image::Rgb;
use imageproc::{
    drawing::{draw_hollow_ellipse_mut, draw_hollow_rect_mut},
    rect::Rect,
};

pub const FACE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const REDNESS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const DARK_SPOT_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
pub const SCORE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const LINE_THICKNESS: u32 = 2;
/// Gap between a region's top edge and the bottom of its marker glyph.
const LABEL_GAP: i32 = 3;
/// Top-left of the score label; its baseline lands on y = 30.
const SCORE_ORIGIN: (i32, i32) = (10, 16);
const SCORE_SCALE: u32 = 2;

/// Draw the face box, every defect region (translated out of ROI space) and
/// the score. The source image is left untouched.
pub fn annotate(
    image: &RasterImage,
    face_box: &BoundingBox,
    redness: &[DefectRegion],
    dark_spots: &[DefectRegion],
    score: f64,
) -> RasterImage {
    let mut canvas = image.clone();

    draw_box(&mut canvas, face_box, FACE_COLOR);

    for region in redness {
        let b = region.offset_by(face_box);
        draw_box(&mut canvas, &b, REDNESS_COLOR);
        draw_label(&mut canvas, &b, "R", REDNESS_COLOR);
    }

    for region in dark_spots {
        let b = region.offset_by(face_box);
        draw_ellipse(&mut canvas, &b, DARK_SPOT_COLOR);
        draw_label(&mut canvas, &b, "D", DARK_SPOT_COLOR);
    }

    let text = format!("Skin Score: {score:.1}");
    glyphs::draw_text(
        &mut canvas,
        SCORE_ORIGIN.0,
        SCORE_ORIGIN.1,
        &text,
        SCORE_COLOR,
        SCORE_SCALE,
    );

    canvas
}

/// Hollow rectangle, drawn inward `LINE_THICKNESS` pixels.
fn draw_box(canvas: &mut RasterImage, b: &BoundingBox, color: Rgb<u8>) {
    for inset in 0..LINE_THICKNESS {
        let (w, h) = (
            b.width.saturating_sub(2 * inset),
            b.height.saturating_sub(2 * inset),
        );
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((b.x + inset) as i32, (b.y + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn draw_ellipse(canvas: &mut RasterImage, b: &BoundingBox, color: Rgb<u8>) {
    let center = ((b.x + b.width / 2) as i32, (b.y + b.height / 2) as i32);
    let (rx, ry) = ((b.width / 2).max(1) as i32, (b.height / 2).max(1) as i32);
    for inset in 0..LINE_THICKNESS as i32 {
        if rx - inset < 1 || ry - inset < 1 {
            break;
        }
        draw_hollow_ellipse_mut(canvas, center, rx - inset, ry - inset, color);
    }
}

fn draw_label(canvas: &mut RasterImage, b: &BoundingBox, text: &str, color: Rgb<u8>) {
    let y = b.y as i32 - LABEL_GAP - glyphs::GLYPH_HEIGHT as i32;
    glyphs::draw_text(canvas, b.x as i32, y, text, color, 1);
}

/// A 5×7 bitmap font covering what the overlay prints.
mod glyphs {
    use crate::types::RasterImage;
    use image::Rgb;

    pub const GLYPH_WIDTH: u32 = 5;
    pub const GLYPH_HEIGHT: u32 = 7;
    const ADVANCE: u32 = GLYPH_WIDTH + 1;

    /// Rows top to bottom; bit 4 is the leftmost column.
    fn glyph(c: char) -> Option<[u8; 7]> {
        let rows = match c {
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
            'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
            'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
            'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
            'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
            'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
            'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
            'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
            ' ' => [0; 7],
            _ => return None,
        };
        Some(rows)
    }

    /// Render `text` with its top-left corner at `(x, y)`, each font pixel
    /// drawn as a `scale`×`scale` block. Pixels outside the canvas are
    /// dropped; unknown characters leave a blank cell.
    pub fn draw_text(
        canvas: &mut RasterImage,
        x: i32,
        y: i32,
        text: &str,
        color: Rgb<u8>,
        scale: u32,
    ) {
        let scale = scale.max(1) as i32;
        let mut pen_x = x;
        for c in text.chars() {
            if let Some(rows) = glyph(c) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH as i32 {
                        if bits & (0x10 >> col) == 0 {
                            continue;
                        }
                        let px = pen_x + col * scale;
                        let py = y + row as i32 * scale;
                        fill_block(canvas, px, py, scale, color);
                    }
                }
            }
            pen_x += ADVANCE as i32 * scale;
        }
    }

    fn fill_block(canvas: &mut RasterImage, x: i32, y: i32, size: i32, color: Rgb<u8>) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        for yy in y.max(0)..(y + size).min(h) {
            for xx in x.max(0)..(x + size).min(w) {
                canvas.put_pixel(xx as u32, yy as u32, color);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DefectKind, Severity};

    const BG: Rgb<u8> = Rgb([100, 100, 100]);

    fn region(kind: DefectKind, x: u32, y: u32, w: u32, h: u32) -> DefectRegion {
        DefectRegion {
            x,
            y,
            width: w,
            height: h,
            area: w * h,
            severity: Severity::Mild,
            kind,
            circularity: None,
        }
    }

    #[test]
    fn test_source_is_untouched() {
        let image = RasterImage::from_pixel(120, 120, BG);
        let face = BoundingBox::new(20, 20, 80, 80);
        let out = annotate(&image, &face, &[], &[], 100.0);
        assert!(image.pixels().all(|p| *p == BG));
        assert_ne!(out, image);
        assert_eq!(out.dimensions(), image.dimensions());
    }

    #[test]
    fn test_face_box_outline() {
        let image = RasterImage::from_pixel(120, 120, BG);
        let face = BoundingBox::new(20, 40, 80, 60);
        let out = annotate(&image, &face, &[], &[], 100.0);
        assert_eq!(*out.get_pixel(20, 70), FACE_COLOR);
        assert_eq!(*out.get_pixel(21, 70), FACE_COLOR);
        assert_eq!(*out.get_pixel(99, 99), FACE_COLOR);
        assert_eq!(*out.get_pixel(60, 70), BG);
    }

    #[test]
    fn test_regions_are_offset_by_face_box() {
        let image = RasterImage::from_pixel(200, 200, BG);
        let face = BoundingBox::new(50, 60, 120, 120);
        let redness = [region(DefectKind::Redness, 10, 30, 20, 20)];
        let out = annotate(&image, &face, &redness, &[], 98.0);

        // Left edge of the red box lands at face.x + region.x.
        assert_eq!(*out.get_pixel(60, 100), REDNESS_COLOR);
        // The untranslated position stays background.
        assert_eq!(*out.get_pixel(10, 40), BG);
        // Label sits above the box.
        let label_rows = (60 + 30 - 3 - 7)..(60 + 30 - 3);
        assert!(label_rows
            .flat_map(|y| (60..65).map(move |x| (x, y)))
            .any(|(x, y)| *out.get_pixel(x, y) == REDNESS_COLOR));
    }

    #[test]
    fn test_dark_spot_ellipse() {
        let image = RasterImage::from_pixel(200, 200, BG);
        let face = BoundingBox::new(40, 40, 120, 120);
        let dark = [region(DefectKind::DarkSpot, 40, 40, 21, 21)];
        let out = annotate(&image, &face, &[], &dark, 99.0);
        // Centre (90, 90), radius 10: rightmost point is on the outline.
        assert_eq!(*out.get_pixel(100, 90), DARK_SPOT_COLOR);
        assert_eq!(*out.get_pixel(90, 90), BG);
    }

    #[test]
    fn test_score_text_drawn_top_left() {
        let image = RasterImage::from_pixel(300, 100, BG);
        let face = BoundingBox::new(150, 40, 50, 50);
        let out = annotate(&image, &face, &[], &[], 73.5);
        let inked = (16..30)
            .flat_map(|y| (10..40).map(move |x| (x, y)))
            .filter(|&(x, y)| *out.get_pixel(x, y) == SCORE_COLOR)
            .count();
        assert!(inked > 20, "inked={inked}");
    }

    #[test]
    fn test_score_label_reads_skin_score() {
        let image = RasterImage::from_pixel(300, 100, BG);
        let face = BoundingBox::new(150, 40, 50, 50);
        let out = annotate(&image, &face, &[], &[], 73.5);

        let mut expected = image.clone();
        glyphs::draw_text(
            &mut expected,
            SCORE_ORIGIN.0,
            SCORE_ORIGIN.1,
            "Skin Score: 73.5",
            SCORE_COLOR,
            SCORE_SCALE,
        );
        // Everything above the face box is the label alone.
        for y in 0..40 {
            for x in 0..300 {
                assert_eq!(out.get_pixel(x, y), expected.get_pixel(x, y), "({x}, {y})");
            }
        }
        // Baseline: the last glyph row ends on y = 30.
        assert!((10..40).any(|x| *out.get_pixel(x, 29) == SCORE_COLOR));
        assert!((10..300).all(|x| *out.get_pixel(x, 30) == BG));
    }

    #[test]
    fn test_region_at_top_edge_does_not_panic() {
        let image = RasterImage::from_pixel(64, 64, BG);
        let face = BoundingBox::full(64, 64);
        let redness = [region(DefectKind::Redness, 0, 0, 64, 64)];
        let dark = [region(DefectKind::DarkSpot, 60, 0, 4, 1)];
        let out = annotate(&image, &face, &redness, &dark, 0.0);
        assert_eq!(out.dimensions(), (64, 64));
    }
}
