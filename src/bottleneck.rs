// Bottleneck detection by share of total window duration
//
// A single slow test can dominate a suite that runs thousands of fast ones;
// counts alone hide that. Each subject (test or phase) is ranked by the
// fraction of wall-clock time it consumed.

use crate::record::Outcome;
use crate::severity::{classify, Severity, TierBoundary};
use crate::store::MetricWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a bottleneck finding is about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckScope {
    /// Group by test name
    #[default]
    Test,
    /// Group by phase, falling back to the test name for records without one
    Phase,
}

/// A test or phase that dominates execution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckFinding {
    /// Test or phase name
    pub subject: String,

    /// Fraction of total window duration (0-1)
    pub share: f64,

    pub severity: Severity,

    /// Executions of the subject in the window
    pub runs: usize,

    /// Failed executions of the subject in the window
    pub failures: usize,

    pub total_duration_secs: f64,

    pub mean_duration_secs: f64,
}

impl BottleneckFinding {
    /// Format as human-readable report line
    pub fn to_report_string(&self) -> String {
        let failures = if self.failures > 0 {
            format!(", {} failed", self.failures)
        } else {
            String::new()
        };
        format!(
            "[{}] {} ({:.1}% of total, {:.3}s over {} runs, mean {:.3}s{})",
            self.severity,
            self.subject,
            self.share * 100.0,
            self.total_duration_secs,
            self.runs,
            self.mean_duration_secs,
            failures
        )
    }
}

/// Tier table and grouping for bottleneck detection
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    pub tier_boundaries: Vec<TierBoundary>,
    pub scope: BottleneckScope,
}

#[derive(Default)]
struct SubjectTotals {
    total: f64,
    runs: usize,
    failures: usize,
}

/// Rank subjects of `window` by their share of total duration
///
/// Sorted by share (descending), ties broken by subject name. An empty
/// window, or one whose total duration is zero, yields no findings.
pub fn detect(window: &MetricWindow, thresholds: &ThresholdConfig) -> Vec<BottleneckFinding> {
    // BTreeMap keeps iteration (and so summation) order independent of input order
    let mut totals: BTreeMap<&str, SubjectTotals> = BTreeMap::new();
    for record in window.iter() {
        let key = match thresholds.scope {
            BottleneckScope::Test => record.test.as_str(),
            BottleneckScope::Phase => record.phase_or_test(),
        };
        let entry = totals.entry(key).or_default();
        entry.total += record.duration_secs;
        entry.runs += 1;
        if record.outcome == Outcome::Failed {
            entry.failures += 1;
        }
    }

    let grand_total: f64 = totals.values().map(|t| t.total).sum();
    if grand_total <= 0.0 {
        return Vec::new();
    }

    let mut findings: Vec<BottleneckFinding> = totals
        .into_iter()
        .map(|(subject, t)| {
            let share = (t.total / grand_total).clamp(0.0, 1.0);
            BottleneckFinding {
                subject: subject.to_string(),
                share,
                severity: classify(share, &thresholds.tier_boundaries),
                runs: t.runs,
                failures: t.failures,
                total_duration_secs: t.total,
                mean_duration_secs: t.total / t.runs as f64,
            }
        })
        .collect();

    findings.sort_by(|a, b| {
        b.share
            .total_cmp(&a.share)
            .then_with(|| a.subject.cmp(&b.subject))
    });

    tracing::debug!(
        subjects = findings.len(),
        total_secs = grand_total,
        "bottleneck detection complete"
    );

    findings
}
