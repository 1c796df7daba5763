//! Binary morphology with square structuring elements.
//!
//! A square kernel of side `2r + 1` is separable, so every operation runs as a
//! horizontal pass followed by a vertical pass. Pixels outside the image never
//! influence the result: erosion ignores them and dilation never sees them.

use image::GrayImage;

#[derive(Clone, Copy)]
enum Op {
    Erode,
    Dilate,
}

impl Op {
    fn fold(self, acc: u8, v: u8) -> u8 {
        match self {
            Op::Erode => acc.min(v),
            Op::Dilate => acc.max(v),
        }
    }

    fn identity(self) -> u8 {
        match self {
            Op::Erode => u8::MAX,
            Op::Dilate => 0,
        }
    }
}

fn sweep(mask: &GrayImage, radius: u32, op: Op) -> GrayImage {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if radius == 0 || w == 0 || h == 0 {
        return mask.clone();
    }
    let r = radius as usize;
    let src = mask.as_raw();

    let mut horizontal = vec![0u8; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            horizontal[y * w + x] = row[lo..=hi]
                .iter()
                .fold(op.identity(), |acc, &v| op.fold(acc, v));
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi)
                .map(|yy| horizontal[yy * w + x])
                .fold(op.identity(), |acc, v| op.fold(acc, v));
        }
    }

    GrayImage::from_raw(mask.width(), mask.height(), out)
        .unwrap_or_else(|| mask.clone())
}

/// Erode with a `(2·radius + 1)`-square kernel.
pub fn erode(mask: &GrayImage, radius: u32) -> GrayImage {
    sweep(mask, radius, Op::Erode)
}

/// Dilate with a `(2·radius + 1)`-square kernel.
pub fn dilate(mask: &GrayImage, radius: u32) -> GrayImage {
    sweep(mask, radius, Op::Dilate)
}

/// Closing: dilate then erode. Fills gaps narrower than the kernel.
pub fn close(mask: &GrayImage, radius: u32) -> GrayImage {
    erode(&dilate(mask, radius), radius)
}

/// Opening: erode then dilate. Removes specks smaller than the kernel.
pub fn open(mask: &GrayImage, radius: u32) -> GrayImage {
    dilate(&erode(mask, radius), radius)
}
