//! Connected components and their outer boundaries.
//!
//! Foreground is 8-connected and background 4-connected. Only outer
//! components are reported: anything sitting inside a hole of another
//! component is skipped, like an external-only contour retrieval.

use crate::types::BoundingBox;
use image::GrayImage;
use std::f64::consts::{PI, SQRT_2};

/// Neighbor offsets, anticlockwise from east (y grows downward).
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// One outer connected component of a mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bbox: BoundingBox,
    /// Number of pixels in the component.
    pub area: u32,
    /// Length of the traced outer boundary.
    pub perimeter: f64,
}

impl Blob {
    /// `4π·area / perimeter²`; 0 for a degenerate boundary.
    pub fn circularity(&self) -> f64 {
        if self.perimeter <= 0.0 {
            return 0.0;
        }
        4.0 * PI * self.area as f64 / (self.perimeter * self.perimeter)
    }
}

struct Grid<'a> {
    width: usize,
    height: usize,
    data: &'a [u32],
}

impl Grid<'_> {
    fn get(&self, x: i64, y: i64) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }
}

/// Label 8-connected foreground components in raster order.
///
/// Returns the label grid (0 = background) and, per label, the first pixel
/// met in raster order, which is the top-most, left-most pixel.
fn label_components(mask: &GrayImage) -> (Vec<u32>, Vec<(usize, usize)>) {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let src = mask.as_raw();
    let mut labels = vec![0u32; w * h];
    let mut starts = Vec::new();
    let mut stack = Vec::new();

    for idx in 0..w * h {
        if src[idx] == 0 || labels[idx] != 0 {
            continue;
        }
        starts.push((idx % w, idx / w));
        let label = starts.len() as u32;
        labels[idx] = label;
        stack.push(idx);

        while let Some(cur) = stack.pop() {
            let (cx, cy) = ((cur % w) as i64, (cur / w) as i64);
            for (dx, dy) in DIRECTIONS {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if src[n] != 0 && labels[n] == 0 {
                    labels[n] = label;
                    stack.push(n);
                }
            }
        }
    }

    (labels, starts)
}

/// Background pixels 4-connected to the image border.
fn outside_background(mask: &GrayImage) -> Vec<bool> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let src = mask.as_raw();
    let mut outside = vec![false; w * h];
    let mut stack = Vec::new();

    let seed = |x: usize, y: usize, outside: &mut Vec<bool>, stack: &mut Vec<usize>| {
        let i = y * w + x;
        if src[i] == 0 && !outside[i] {
            outside[i] = true;
            stack.push(i);
        }
    };
    for x in 0..w {
        seed(x, 0, &mut outside, &mut stack);
        seed(x, h - 1, &mut outside, &mut stack);
    }
    for y in 0..h {
        seed(0, y, &mut outside, &mut stack);
        seed(w - 1, y, &mut outside, &mut stack);
    }

    while let Some(cur) = stack.pop() {
        let (cx, cy) = (cur % w, cur / w);
        let neighbors = [
            (cx > 0).then(|| cur - 1),
            (cx + 1 < w).then(|| cur + 1),
            (cy > 0).then(|| cur - w),
            (cy + 1 < h).then(|| cur + w),
        ];
        for n in neighbors.into_iter().flatten() {
            if src[n] == 0 && !outside[n] {
                outside[n] = true;
                stack.push(n);
            }
        }
    }

    outside
}

/// Trace the outer boundary of `label` from its top-left pixel and return its
/// length. Moore-neighbor tracing, stopping once the first move repeats.
fn trace_perimeter(grid: &Grid<'_>, label: u32, start: (usize, usize), area: u32) -> f64 {
    let is_member = |x: i64, y: i64| grid.get(x, y) == Some(label);
    let p0 = (start.0 as i64, start.1 as i64);

    let step = |p: (i64, i64), dir: usize| -> Option<(usize, (i64, i64))> {
        let first = if dir % 2 == 0 { (dir + 7) % 8 } else { (dir + 6) % 8 };
        (0..8).map(|k| (first + k) % 8).find_map(|d| {
            let (dx, dy) = DIRECTIONS[d];
            let next = (p.0 + dx, p.1 + dy);
            is_member(next.0, next.1).then_some((d, next))
        })
    };

    let Some((first_dir, p1)) = step(p0, 7) else {
        return 0.0;
    };

    let move_len = |d: usize| if d % 2 == 0 { 1.0 } else { SQRT_2 };
    let mut length = move_len(first_dir);
    let (mut cur, mut dir) = (p1, first_dir);
    let max_steps = 8 * area as usize + 8;

    for _ in 0..max_steps {
        let Some((d, next)) = step(cur, dir) else {
            break;
        };
        // Back at the start and about to repeat the first move: closed.
        if cur == p0 && next == p1 {
            break;
        }
        length += move_len(d);
        cur = next;
        dir = d;
    }

    length
}

/// Find every outer 8-connected foreground component of `mask`.
///
/// Components are returned in raster order of their top-left pixel.
pub fn find_outer_blobs(mask: &GrayImage) -> Vec<Blob> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let (labels, starts) = label_components(mask);
    let outside = outside_background(mask);

    let mut area = vec![0u32; starts.len()];
    let mut bounds: Vec<(usize, usize, usize, usize)> =
        starts.iter().map(|&(x, y)| (x, y, x, y)).collect();
    for (idx, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let i = label as usize - 1;
        let (x, y) = (idx % w, idx / w);
        area[i] += 1;
        let b = &mut bounds[i];
        b.0 = b.0.min(x);
        b.1 = b.1.min(y);
        b.2 = b.2.max(x);
        b.3 = b.3.max(y);
    }

    let grid = Grid {
        width: w,
        height: h,
        data: &labels,
    };

    starts
        .iter()
        .enumerate()
        .filter(|(_, start)| start.0 == 0 || outside[start.1 * w + start.0 - 1])
        .map(|(i, &start)| {
            let (x0, y0, x1, y1) = bounds[i];
            Blob {
                bbox: BoundingBox::new(
                    x0 as u32,
                    y0 as u32,
                    (x1 - x0 + 1) as u32,
                    (y1 - y0 + 1) as u32,
                ),
                area: area[i],
                perimeter: trace_perimeter(&grid, i as u32 + 1, start, area[i]),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with(w: u32, h: u32, on: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([if on(x, y) { 255 } else { 0 }]))
    }

    #[test]
    fn test_empty_mask() {
        assert!(find_outer_blobs(&mask_with(5, 5, |_, _| false)).is_empty());
        assert!(find_outer_blobs(&GrayImage::new(0, 0)).is_empty());
    }

    #[test]
    fn test_single_pixel() {
        let blobs = find_outer_blobs(&mask_with(5, 5, |x, y| x == 2 && y == 3));
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 1);
        assert_eq!(blobs[0].bbox, BoundingBox::new(2, 3, 1, 1));
        assert_eq!(blobs[0].perimeter, 0.0);
        assert_eq!(blobs[0].circularity(), 0.0);
    }

    #[test]
    fn test_square_perimeter() {
        let blobs = find_outer_blobs(&mask_with(10, 10, |x, y| {
            (2..4).contains(&x) && (2..4).contains(&y)
        }));
        assert_eq!(blobs.len(), 1);
        assert!((blobs[0].perimeter - 4.0).abs() < 1e-9);

        let blobs = find_outer_blobs(&mask_with(20, 20, |x, y| {
            (3..13).contains(&x) && (5..10).contains(&y)
        }));
        assert_eq!(blobs[0].area, 50);
        assert_eq!(blobs[0].bbox, BoundingBox::new(3, 5, 10, 5));
        // Boundary through pixel centers: 2·(9 + 4).
        assert!((blobs[0].perimeter - 26.0).abs() < 1e-9, "{}", blobs[0].perimeter);
    }

    #[test]
    fn test_horizontal_line_perimeter() {
        let blobs = find_outer_blobs(&mask_with(6, 3, |x, y| y == 1 && x < 3));
        assert_eq!(blobs.len(), 1);
        assert!((blobs[0].perimeter - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let blobs = find_outer_blobs(&mask_with(5, 5, |x, y| x == y));
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 5);
        assert!((blobs[0].perimeter - 8.0 * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn test_separate_components_in_raster_order() {
        let blobs = find_outer_blobs(&mask_with(20, 10, |x, y| {
            ((12..15).contains(&x) && (1..3).contains(&y))
                || ((2..5).contains(&x) && (5..8).contains(&y))
        }));
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].bbox.x, 12);
        assert_eq!(blobs[1].bbox.x, 2);
    }

    #[test]
    fn test_nested_component_skipped() {
        // A ring with a dot in its hole: only the ring is reported.
        let blobs = find_outer_blobs(&mask_with(15, 15, |x, y| {
            let ring = (2..13).contains(&x)
                && (2..13).contains(&y)
                && !((4..11).contains(&x) && (4..11).contains(&y));
            ring || (x == 7 && y == 7)
        }));
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].bbox, BoundingBox::new(2, 2, 11, 11));
        assert_eq!(blobs[0].area, 121 - 49);
    }

    #[test]
    fn test_component_touching_border() {
        let blobs = find_outer_blobs(&mask_with(6, 6, |x, _| x < 2));
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 12);
    }

    #[test]
    fn test_disc_is_round_and_line_is_not() {
        let disc = find_outer_blobs(&mask_with(30, 30, |x, y| {
            let (dx, dy) = (x as i64 - 15, y as i64 - 15);
            dx * dx + dy * dy <= 25
        }));
        assert_eq!(disc[0].area, 81);
        assert!(disc[0].circularity() > 0.8, "{}", disc[0].circularity());

        let line = find_outer_blobs(&mask_with(60, 10, |x, y| {
            (5..45).contains(&x) && (4..6).contains(&y)
        }));
        assert_eq!(line[0].area, 80);
        assert!(line[0].circularity() < 0.4, "{}", line[0].circularity());
    }
}
