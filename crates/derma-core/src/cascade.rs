//! Viola-Jones style Haar cascade.
//!
//! A pre-trained cascade is boosted stumps over weighted rectangle sums,
//! read from OpenCV's cascade XML or from an equivalent JSON document.
//! Detection scans a downscaled image pyramid with the fixed base window, so
//! feature sums stay exact at every scale. Each window is variance normalized
//! over its inner `(1, 1, w-2, h-2)` rectangle, and a stump compares
//! `Σ weight·rect_sum / sqrt(area·Σp² − (Σp)²)` with its threshold.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

// Hit grouping, as done by the reference frontal-face detector.
const GROUP_EPS: f64 = 0.2;

/// Subtracted from every stage threshold read from OpenCV XML, as OpenCV does.
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to read cascade: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse cascade: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to parse cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

/// One rectangle of a Haar-like feature, in base-window coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// Decision stump over one Haar-like feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub rects: Vec<WeightedRect>,
    pub threshold: f32,
    /// Vote when the normalized feature is below `threshold`.
    pub left: f32,
    /// Vote otherwise.
    pub right: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

/// A trained cascade. Immutable once loaded; share it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaarCascade {
    /// Base window size `(width, height)`.
    pub window: (u32, u32),
    pub stages: Vec<Stage>,
}

/// Multi-scale scan parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    /// Window growth per scale step; values ≤ 1 are treated as 1.01.
    pub scale_factor: f32,
    /// Raw hits a group needs beyond the first to be reported. 0 disables grouping.
    pub min_neighbors: u32,
    /// Smallest window edge scanned, in pixels. Never below the cascade window.
    pub min_face_size: u32,
    /// Largest window edge scanned, if bounded.
    pub max_face_size: Option<u32>,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_face_size: 0,
            max_face_size: None,
        }
    }
}

impl HaarCascade {
    /// Load and validate a cascade file. `.xml` files are read as OpenCV
    /// cascades, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CascadeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CascadeError::ModelNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let cascade = if is_xml {
            Self::from_opencv_xml(&text)?
        } else {
            Self::from_json(&text)?
        };
        tracing::info!(
            path = %path.display(),
            window = ?cascade.window,
            stages = cascade.stages.len(),
            "loaded face cascade"
        );
        Ok(cascade)
    }

    /// Parse and validate a cascade from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CascadeError> {
        let cascade: HaarCascade = serde_json::from_str(json)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Parse and validate an OpenCV `opencv-cascade-classifier` document made
    /// of untilted HAAR stumps, such as `haarcascade_frontalface_default.xml`.
    pub fn from_opencv_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| invalid("no <cascade> element"))?;

        if let Some(kind) = child(root, "featureType") {
            let kind = kind.text().unwrap_or("").trim();
            if kind != "HAAR" {
                return Err(invalid(format!("unsupported feature type {kind:?}")));
            }
        }
        let window = (
            number(required(root, "width")?, "width")?,
            number(required(root, "height")?, "height")?,
        );

        let features = elements(required(root, "features")?)
            .map(xml_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let stages = elements(required(root, "stages")?)
            .enumerate()
            .map(|(si, stage)| xml_stage(si, stage, &features))
            .collect::<Result<Vec<_>, _>>()?;

        let cascade = HaarCascade { window, stages };
        cascade.validate()?;
        Ok(cascade)
    }

    fn validate(&self) -> Result<(), CascadeError> {
        let (ww, wh) = self.window;
        if ww == 0 || wh == 0 {
            return Err(invalid("window must be non-empty"));
        }
        if self.stages.is_empty() {
            return Err(invalid("cascade has no stages"));
        }
        for (si, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(invalid(format!("stage {si} has no classifiers")));
            }
            for clf in &stage.classifiers {
                if clf.rects.is_empty() {
                    return Err(invalid(format!("stage {si} has a featureless classifier")));
                }
                let outside = |r: &&WeightedRect| {
                    r.width == 0 || r.height == 0 || r.x + r.width > ww || r.y + r.height > wh
                };
                if let Some(r) = clf.rects.iter().find(outside) {
                    return Err(invalid(format!(
                        "stage {si}: rect {}x{}+{}+{} falls outside the {ww}x{wh} window",
                        r.width, r.height, r.x, r.y
                    )));
                }
            }
        }
        Ok(())
    }

    /// Scan `gray` at every scale and position and return grouped hits in
    /// scan order.
    ///
    /// Each scale shrinks the image by the current factor and slides the base
    /// window over it, two pixels at a time up to a factor of 2 and one pixel
    /// beyond. Hits are mapped back to source coordinates.
    pub fn detect(&self, gray: &GrayImage, params: &ScanParams) -> Vec<BoundingBox> {
        let (img_w, img_h) = gray.dimensions();
        let (base_w, base_h) = self.window;
        let factor = params.scale_factor.max(1.01);

        let mut scale = 1.0f32
            .max(params.min_face_size as f32 / base_w as f32)
            .max(params.min_face_size as f32 / base_h as f32);
        let mut hits = Vec::new();

        loop {
            let win_w = (base_w as f32 * scale).round() as u32;
            let win_h = (base_h as f32 * scale).round() as u32;
            if win_w > img_w || win_h > img_h {
                break;
            }
            if params.max_face_size.is_some_and(|max| win_w.max(win_h) > max) {
                break;
            }
            let level_w = (img_w as f32 / scale).round() as u32;
            let level_h = (img_h as f32 / scale).round() as u32;
            if level_w < base_w || level_h < base_h {
                break;
            }

            let level = if (level_w, level_h) == (img_w, img_h) {
                Cow::Borrowed(gray)
            } else {
                Cow::Owned(imageops::resize(gray, level_w, level_h, FilterType::Triangle))
            };
            let integral = IntegralImage::new(&level);
            let step = if scale > 2.0 { 1 } else { 2 };
            for y in (0..=level_h - base_h).step_by(step) {
                for x in (0..=level_w - base_w).step_by(step) {
                    if self.accepts(&integral, x, y) {
                        let hx = (x as f32 * scale).round() as u32;
                        let hy = (y as f32 * scale).round() as u32;
                        hits.push(BoundingBox::new(hx, hy, win_w, win_h));
                    }
                }
            }
            scale *= factor;
        }

        tracing::debug!(raw_hits = hits.len(), "cascade scan complete");

        group_rectangles(hits, params.min_neighbors, GROUP_EPS)
            .into_iter()
            .filter_map(|b| clip_to_image(b, img_w, img_h))
            .collect()
    }

    /// True if the base window at `(x, y)` of one pyramid level passes every
    /// stage.
    fn accepts(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        let (w, h) = self.window;
        let nf = integral.norm_factor(x + 1, y + 1, w.saturating_sub(2), h.saturating_sub(2));

        self.stages.iter().all(|stage| {
            let votes: f32 = stage
                .classifiers
                .iter()
                .map(|clf| {
                    let raw: f64 = clf
                        .rects
                        .iter()
                        .map(|r| {
                            let sum = integral.sum(x + r.x, y + r.y, r.width, r.height);
                            r.weight as f64 * sum as f64
                        })
                        .sum();
                    if raw / nf < clf.threshold as f64 {
                        clf.left
                    } else {
                        clf.right
                    }
                })
                .sum();
            votes >= stage.threshold
        })
    }
}

fn invalid(msg: impl Into<String>) -> CascadeError {
    CascadeError::Invalid(msg.into())
}

fn elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    tag: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    elements(node).find(|n| n.has_tag_name(tag))
}

fn required<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    tag: &str,
) -> Result<roxmltree::Node<'a, 'input>, CascadeError> {
    child(node, tag)
        .ok_or_else(|| invalid(format!("missing <{tag}> in <{}>", node.tag_name().name())))
}

fn token<T: FromStr>(text: &str, what: &str) -> Result<T, CascadeError> {
    text.parse()
        .map_err(|_| invalid(format!("bad {what} value {text:?}")))
}

fn number<T: FromStr>(node: roxmltree::Node, what: &str) -> Result<T, CascadeError> {
    token(node.text().unwrap_or("").trim(), what)
}

fn tokens<'a>(node: roxmltree::Node<'a, '_>) -> Vec<&'a str> {
    node.text().unwrap_or("").split_ascii_whitespace().collect()
}

/// `<_><rects><_>x y w h weight</_>...</rects></_>`
fn xml_feature(node: roxmltree::Node) -> Result<Vec<WeightedRect>, CascadeError> {
    if let Some(tilted) = child(node, "tilted") {
        if number::<u8>(tilted, "tilted")? != 0 {
            return Err(invalid("tilted features are not supported"));
        }
    }
    elements(required(node, "rects")?)
        .map(|rect| {
            let parts = tokens(rect);
            let [x, y, width, height, weight] = parts[..] else {
                return Err(invalid(format!("rect needs 5 values, got {}", parts.len())));
            };
            Ok(WeightedRect {
                x: token(x, "rect x")?,
                y: token(y, "rect y")?,
                width: token(width, "rect width")?,
                height: token(height, "rect height")?,
                weight: token(weight, "rect weight")?,
            })
        })
        .collect()
}

/// `<_><stageThreshold/><weakClassifiers><_><internalNodes/><leafValues/></_>...`
///
/// Only single-split trees are accepted. Their node reads
/// `left right featureIdx threshold`, where a child `<= 0` names leaf `-child`.
fn xml_stage(
    si: usize,
    node: roxmltree::Node,
    features: &[Vec<WeightedRect>],
) -> Result<Stage, CascadeError> {
    let threshold: f32 = number(required(node, "stageThreshold")?, "stageThreshold")?;
    let classifiers = elements(required(node, "weakClassifiers")?)
        .map(|weak| {
            let split = tokens(required(weak, "internalNodes")?);
            let leaves = tokens(required(weak, "leafValues")?)
                .into_iter()
                .map(|v| token::<f32>(v, "leaf"))
                .collect::<Result<Vec<_>, _>>()?;
            let [left, right, feature, split_threshold] = split[..] else {
                return Err(invalid(format!("stage {si}: only stump classifiers are supported")));
            };

            let leaf = |child: &str| -> Result<f32, CascadeError> {
                let child: i64 = token(child, "node child")?;
                (child <= 0)
                    .then(|| leaves.get(child.unsigned_abs() as usize).copied())
                    .flatten()
                    .ok_or_else(|| {
                        invalid(format!("stage {si}: classifier child {child} is not a leaf"))
                    })
            };
            let feature: usize = token(feature, "feature index")?;
            let rects = features
                .get(feature)
                .cloned()
                .ok_or_else(|| invalid(format!("stage {si}: unknown feature {feature}")))?;

            Ok(WeakClassifier {
                rects,
                threshold: token(split_threshold, "node threshold")?,
                left: leaf(left)?,
                right: leaf(right)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn clip_to_image(b: BoundingBox, img_w: u32, img_h: u32) -> Option<BoundingBox> {
    if b.x >= img_w || b.y >= img_h {
        return None;
    }
    let width = b.width.min(img_w - b.x);
    let height = b.height.min(img_h - b.y);
    (width > 0 && height > 0).then_some(BoundingBox::new(b.x, b.y, width, height))
}

/// Summed-area tables of pixel values and squared pixel values.
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        let src = gray.as_raw();

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = src[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq }
    }

    fn lookup(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y1 * stride + x0]
            - table[y0 * stride + x1]
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sq, self.stride, x, y, w, h)
    }

    /// `sqrt(area·Σp² − (Σp)²)` over a rectangle, or 1 when it is flat.
    fn norm_factor(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let area = w as f64 * h as f64;
        let sum = self.sum(x, y, w, h) as f64;
        let nf = area * self.sq_sum(x, y, w, h) as f64 - sum * sum;
        if nf > 0.0 {
            nf.sqrt()
        } else {
            1.0
        }
    }
}

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster overlapping hits, keep clusters with more than `min_neighbors`
/// members, average each cluster, and drop clusters nested in a stronger one.
///
/// Output follows the order in which each cluster's first hit was found.
fn group_rectangles(hits: Vec<BoundingBox>, min_neighbors: u32, eps: f64) -> Vec<BoundingBox> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits;
    }

    let n = hits.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&hits[i], &hits[j], eps) {
                let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    // Cluster ids in order of first appearance.
    let mut cluster_of_root = vec![usize::MAX; n];
    let mut sums: Vec<([u64; 4], u32)> = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let root = find_root(&mut parent, i);
        if cluster_of_root[root] == usize::MAX {
            cluster_of_root[root] = sums.len();
            sums.push(([0; 4], 0));
        }
        let (acc, count) = &mut sums[cluster_of_root[root]];
        acc[0] += hit.x as u64;
        acc[1] += hit.y as u64;
        acc[2] += hit.width as u64;
        acc[3] += hit.height as u64;
        *count += 1;
    }

    let clusters: Vec<(BoundingBox, u32)> = sums
        .into_iter()
        .filter(|(_, count)| *count > min_neighbors)
        .map(|(acc, count)| {
            let avg = |v: u64| (v as f64 / count as f64).round() as u32;
            (BoundingBox::new(avg(acc[0]), avg(acc[1]), avg(acc[2]), avg(acc[3])), count)
        })
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|(i, (r1, n1))| {
            !clusters.iter().enumerate().any(|(j, (r2, n2))| {
                if *i == j {
                    return false;
                }
                let dx = (r2.width as f64 * eps).round() as i64;
                let dy = (r2.height as f64 * eps).round() as i64;
                let inside = r1.x as i64 >= r2.x as i64 - dx
                    && r1.y as i64 >= r2.y as i64 - dy
                    && (r1.x + r1.width) as i64 <= (r2.x + r2.width) as i64 + dx
                    && (r1.y + r1.height) as i64 <= (r2.y + r2.height) as i64 + dy;
                inside && (*n2 > (*n1).max(3) || *n1 < 3)
            })
        })
        .map(|(_, (r, _))| *r)
        .collect()
}
