//! Skin score: 100 minus a per-region penalty, saturating at both ends.

use crate::types::DefectRegion;

pub const MAX_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = 0.0;

/// Score the detected regions. Each region costs `kind.penalty(severity)`;
/// the total is order independent and clamped to `[0, 100]`.
pub fn score(redness: &[DefectRegion], dark_spots: &[DefectRegion]) -> f64 {
    let penalty: f64 = redness
        .iter()
        .chain(dark_spots)
        .map(|r| r.kind.penalty(r.severity))
        .sum();
    (MAX_SCORE - penalty).clamp(MIN_SCORE, MAX_SCORE)
}
