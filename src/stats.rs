//! Summary statistics over metric windows
//!
//! Percentiles use linear interpolation between closest ranks
//! (index = p * (n - 1)); an exact rank resolves to the lower index.
//! Values are sorted with a total order before any arithmetic, so the same
//! window always produces a bit-identical [`Aggregate`].

use crate::error::{AnalysisError, Result};
use crate::record::MetricKind;
use crate::store::MetricWindow;
use serde::{Deserialize, Serialize};

/// Summary statistics of one metric over one window
///
/// Invariants: `p50 <= p95 <= p99 <= max` and `min <= mean <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub metric: MetricKind,
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    /// Population standard deviation
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

impl Aggregate {
    /// Compute an aggregate from raw values
    pub fn from_values(metric: MetricKind, values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(AnalysisError::insufficient(
                format!("{} aggregate", metric),
                1,
                0,
            ));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let min = sorted[0];
        let max = sorted[count - 1];

        // Summing in sorted order keeps the result independent of window order;
        // clamping absorbs rounding drift on near-constant inputs.
        let sum: f64 = sorted.iter().sum();
        let mean = (sum / count as f64).clamp(min, max);

        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Ok(Self {
            metric,
            count,
            mean,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            stddev: variance.sqrt(),
            min,
            max,
        })
    }

    /// Coefficient of variation (stddev / |mean|); 0 when the mean is ~0
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean.abs() < 1e-12 {
            return 0.0;
        }
        self.stddev / self.mean.abs()
    }

    /// Signed distance of `value` from the mean in standard deviations
    ///
    /// `None` when the baseline has no spread.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.stddev > 0.0 {
            Some((value - self.mean) / self.stddev)
        } else {
            None
        }
    }
}

/// Aggregate `metric` over every record in `window` that measured it
///
/// Fails with `InsufficientData` when no record carries the metric.
pub fn aggregate(window: &MetricWindow, metric: MetricKind) -> Result<Aggregate> {
    Aggregate::from_values(metric, &window.values(metric))
}

/// Percentile (0-100) of already sorted data
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let index = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f64;
        (sorted[lower] + (sorted[upper] - sorted[lower]) * weight).min(sorted[upper])
    }
}
