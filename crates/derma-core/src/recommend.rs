//! Textual guidance derived from defect counts and the score.
//!
//! Three independent rule blocks (redness, pigmentation, overall score) are
//! evaluated in that order and their messages concatenated.

pub const REDNESS_HIGH: [&str; 2] = [
    "Consider using anti-inflammatory products with niacinamide or centella asiatica",
    "Avoid harsh exfoliants and focus on gentle, soothing skincare",
];
pub const REDNESS_LOW: &str = "Use a gentle cleanser and moisturizer suitable for sensitive skin";

pub const DARK_SPOTS_HIGH: [&str; 2] = [
    "Consider using vitamin C serum or products with kojic acid for hyperpigmentation",
    "Always use SPF 30+ sunscreen to prevent further dark spots",
];
pub const DARK_SPOTS_LOW: &str = "Use a daily SPF to prevent dark spots from worsening";

pub const SCORE_GREAT: &str = "Your skin looks great! Maintain your current routine";
pub const SCORE_GOOD: &str = "Focus on consistency with your skincare routine";
pub const SCORE_LOW: &str = "Consider consulting a dermatologist for personalized advice";

const REDNESS_HIGH_COUNT: usize = 5;
const DARK_SPOTS_HIGH_COUNT: usize = 10;
const GREAT_SCORE: f64 = 90.0;
const GOOD_SCORE: f64 = 70.0;

pub fn recommend(redness_count: usize, dark_spot_count: usize, score: f64) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    if redness_count > REDNESS_HIGH_COUNT {
        out.extend(REDNESS_HIGH);
    } else if redness_count > 0 {
        out.push(REDNESS_LOW);
    }

    if dark_spot_count > DARK_SPOTS_HIGH_COUNT {
        out.extend(DARK_SPOTS_HIGH);
    } else if dark_spot_count > 0 {
        out.push(DARK_SPOTS_LOW);
    }

    out.push(if score >= GREAT_SCORE {
        SCORE_GREAT
    } else if score >= GOOD_SCORE {
        SCORE_GOOD
    } else {
        SCORE_LOW
    });

    out.into_iter().map(String::from).collect()
}
