use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tier of a finding
///
/// `Negligible` marks a finding below the lowest configured tier boundary;
/// such findings are reported but never trigger recommendations.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Rank above `Low` used for priority boosts (`Negligible` has none)
    pub fn boost_rank(&self) -> Option<u32> {
        match self {
            Severity::Negligible => None,
            Severity::Low => Some(0),
            Severity::Medium => Some(1),
            Severity::High => Some(2),
            Severity::Critical => Some(3),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Negligible => "negligible",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.pad(s)
    }
}

/// One `(threshold, severity)` pair of a tier table
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct TierBoundary {
    pub threshold: f64,
    pub severity: Severity,
}

impl TierBoundary {
    pub const fn new(threshold: f64, severity: Severity) -> Self {
        Self {
            threshold,
            severity,
        }
    }
}

/// Classify `value` against a tier table
///
/// The highest boundary whose threshold `value` meets wins, regardless of
/// the order the boundaries were configured in.
pub fn classify(value: f64, boundaries: &[TierBoundary]) -> Severity {
    boundaries
        .iter()
        .filter(|b| value >= b.threshold)
        .max_by(|a, b| a.threshold.total_cmp(&b.threshold))
        .map(|b| b.severity)
        .unwrap_or(Severity::Negligible)
}
