//! Trend over a user's stored analyses.
//!
//! Storage is the caller's business; this module only turns a set of records
//! into the series a progress chart needs.

use crate::pipeline::AnalysisReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted summary of one successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_date: DateTime<Utc>,
    pub skin_score: f64,
    pub redness_count: usize,
    pub dark_spot_count: usize,
}

impl AnalysisRecord {
    /// Summarize a report taken at `at`. Failed reports produce no record.
    pub fn from_report(report: &AnalysisReport, at: DateTime<Utc>) -> Option<Self> {
        let payload = report.payload.as_ref().filter(|_| report.success)?;
        Some(Self {
            analysis_date: at,
            skin_score: payload.skin_score,
            redness_count: payload.detected_issues.redness_count,
            dark_spot_count: payload.detected_issues.dark_spots_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub dates: Vec<DateTime<Utc>>,
    pub skin_scores: Vec<f64>,
    pub redness_counts: Vec<usize>,
    pub dark_spot_counts: Vec<usize>,
    pub average_score: f64,
    /// Latest score minus earliest; 0 with a single record.
    pub improvement: f64,
}

/// Chronological summary of the records dated at or after `since`.
/// `None` when no record falls in the window.
pub fn summarize(records: &[AnalysisRecord], since: DateTime<Utc>) -> Option<ProgressSummary> {
    let mut window: Vec<&AnalysisRecord> = records
        .iter()
        .filter(|r| r.analysis_date >= since)
        .collect();
    if window.is_empty() {
        return None;
    }
    window.sort_by_key(|r| r.analysis_date);

    let skin_scores: Vec<f64> = window.iter().map(|r| r.skin_score).collect();
    let average_score = skin_scores.iter().sum::<f64>() / skin_scores.len() as f64;
    let improvement = match (skin_scores.first(), skin_scores.last()) {
        (Some(first), Some(last)) if skin_scores.len() > 1 => last - first,
        _ => 0.0,
    };

    Some(ProgressSummary {
        dates: window.iter().map(|r| r.analysis_date).collect(),
        redness_counts: window.iter().map(|r| r.redness_count).collect(),
        dark_spot_counts: window.iter().map(|r| r.dark_spot_count).collect(),
        skin_scores,
        average_score,
        improvement,
    })
}
