//! Baseline anomaly detection
//!
//! A record is anomalous when its value lies more than `sensitivity`
//! standard deviations from the baseline mean. Baselines with too few
//! samples are refused outright: a noisy baseline produces false positives.

use crate::error::{AnalysisError, Result};
use crate::record::MetricKind;
use crate::severity::{classify, Severity, TierBoundary};
use crate::stats::Aggregate;
use crate::store::MetricWindow;
use serde::{Deserialize, Serialize};

/// Detected anomaly with the baseline it was measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub test: String,
    pub sequence: u64,
    pub timestamp_nanos: u64,
    pub metric: MetricKind,
    /// Observed value
    pub value: f64,
    /// Signed distance from the baseline mean in standard deviations
    pub deviation: f64,
    pub severity: Severity,
    /// Baseline snapshot at time of detection
    pub baseline: Aggregate,
}

impl AnomalyFinding {
    /// Whether the value is above the baseline (slower, heavier)
    pub fn is_above_baseline(&self) -> bool {
        self.deviation > 0.0
    }

    pub fn to_report_string(&self) -> String {
        format!(
            "[{}] {} #{} {} = {:.3}{} ({:+.1}σ, baseline {:.3} ± {:.3})",
            self.severity,
            self.test,
            self.sequence,
            self.metric,
            self.value,
            self.metric.unit(),
            self.deviation,
            self.baseline.mean,
            self.baseline.stddev
        )
    }
}

/// Detection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySettings {
    /// Z-score threshold for anomaly
    pub sensitivity: f64,
    pub min_baseline_samples: usize,
    /// σ-distance tiers for severity
    pub tier_boundaries: Vec<TierBoundary>,
}

/// Flag records of `window` that deviate from `baseline`
///
/// The metric examined is `baseline.metric`. Findings are chronological
/// (timestamp, then insertion order). A baseline with zero spread reports
/// nothing: every deviation would be infinitely many σ away.
pub fn detect(
    window: &MetricWindow,
    baseline: &Aggregate,
    settings: &AnomalySettings,
) -> Result<Vec<AnomalyFinding>> {
    if baseline.count < settings.min_baseline_samples {
        return Err(AnalysisError::insufficient(
            format!("{} anomaly baseline", baseline.metric),
            settings.min_baseline_samples,
            baseline.count,
        ));
    }

    let metric = baseline.metric;
    let findings: Vec<AnomalyFinding> = window
        .iter()
        .filter_map(|record| {
            let value = record.value(metric)?;
            let deviation = baseline.z_score(value)?;
            if (value - baseline.mean).abs() <= settings.sensitivity * baseline.stddev {
                return None;
            }
            Some(AnomalyFinding {
                test: record.test.clone(),
                sequence: record.sequence,
                timestamp_nanos: record.timestamp_nanos,
                metric,
                value,
                deviation,
                severity: classify(deviation.abs(), &settings.tier_boundaries),
                baseline: *baseline,
            })
        })
        .collect();

    if !findings.is_empty() {
        tracing::debug!(
            metric = %metric,
            anomalies = findings.len(),
            baseline_mean = baseline.mean,
            baseline_stddev = baseline.stddev,
            "anomalies detected"
        );
    }

    Ok(findings)
}

/// Severity distribution and top anomalies, most severe first
pub fn summarize(findings: &[AnomalyFinding], top: usize) -> String {
    if findings.is_empty() {
        return "No anomalies detected.\n".to_string();
    }

    let mut report = format!("Total anomalies detected: {}\n", findings.len());
    for severity in [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Negligible,
    ] {
        let count = findings.iter().filter(|f| f.severity == severity).count();
        if count > 0 {
            report.push_str(&format!("  {:<10} {} anomalies\n", severity, count));
        }
    }

    let mut sorted: Vec<&AnomalyFinding> = findings.iter().collect();
    sorted.sort_by(|a, b| b.deviation.abs().total_cmp(&a.deviation.abs()));

    report.push_str("Top anomalies (by σ):\n");
    for (i, finding) in sorted.iter().take(top).enumerate() {
        report.push_str(&format!("  {}. {}\n", i + 1, finding.to_report_string()));
    }
    if sorted.len() > top {
        report.push_str(&format!("  ... and {} more\n", sorted.len() - top));
    }

    report
}
