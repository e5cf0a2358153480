//! Baseline comparison by relative change of the mean
//!
//! Complements the σ-based anomaly detector with the simpler question a CI
//! gate asks: did the average get more than X% worse than last time?

use crate::config::RegressionThresholds;
use crate::record::MetricKind;
use crate::stats::Aggregate;
use serde::{Deserialize, Serialize};

/// Classification of a metric's change against its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Regression,
    Improvement,
    Unchanged,
}

/// Change of one metric's mean between a baseline and the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub metric: MetricKind,
    pub previous_mean: f64,
    pub current_mean: f64,
    /// (current - previous) / previous; `None` when the baseline mean is zero
    pub relative_change: Option<f64>,
    pub threshold: f64,
    pub kind: ChangeKind,
}

impl MetricChange {
    pub fn to_report_string(&self) -> String {
        let change = match self.relative_change {
            Some(c) => format!("{:+.1}%", c * 100.0),
            None => "n/a".to_string(),
        };
        format!(
            "{:<12} {:>12.3} -> {:>12.3} ({}, threshold {:.0}%) {:?}",
            self.metric,
            self.previous_mean,
            self.current_mean,
            change,
            self.threshold * 100.0,
            self.kind
        )
    }
}

/// Compare one metric's aggregates
///
/// A change beyond the threshold in either direction is classified;
/// increases are regressions because every metric is a cost.
pub fn compare(previous: &Aggregate, current: &Aggregate, threshold: f64) -> MetricChange {
    let relative_change = if previous.mean.abs() > f64::EPSILON {
        Some((current.mean - previous.mean) / previous.mean.abs())
    } else {
        None
    };

    let kind = match relative_change {
        Some(c) if c > threshold => ChangeKind::Regression,
        Some(c) if c < -threshold => ChangeKind::Improvement,
        Some(_) => ChangeKind::Unchanged,
        // From nothing to something is a regression regardless of threshold
        None if current.mean > f64::EPSILON => ChangeKind::Regression,
        None => ChangeKind::Unchanged,
    };

    MetricChange {
        metric: current.metric,
        previous_mean: previous.mean,
        current_mean: current.mean,
        relative_change,
        threshold,
        kind,
    }
}

/// Compare every metric present in both sets of aggregates
pub fn compare_all(
    previous: &[Aggregate],
    current: &[Aggregate],
    thresholds: &RegressionThresholds,
) -> Vec<MetricChange> {
    current
        .iter()
        .filter_map(|cur| {
            let prev = previous.iter().find(|p| p.metric == cur.metric)?;
            Some(compare(prev, cur, thresholds.for_metric(cur.metric)))
        })
        .collect()
}
