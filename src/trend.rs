//! Trend analysis across successive windows
//!
//! Fits an ordinary least squares line through the per-window means of a
//! metric (x = window index) and classifies the slope. Every metric is a
//! cost, so a rising line is a regression.

use crate::error::{AnalysisError, Result};
use crate::record::MetricKind;
use crate::stats::aggregate;
use crate::store::MetricWindow;
use serde::{Deserialize, Serialize};

/// Direction of a metric across windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// Result of fitting a line through window means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric: MetricKind,
    /// Change of the window mean per window
    pub slope: f64,
    pub direction: TrendDirection,
    /// R² of the linear fit (0-1)
    pub confidence: f64,
    /// Whether `confidence` clears the configured floor
    pub is_confident: bool,
    /// Means of the non-empty windows, oldest first
    pub window_means: Vec<f64>,
}

/// Thresholds for trend classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSettings {
    pub epsilon: f64,
    pub confidence_floor: f64,
}

/// Classify the trend of `metric` across `windows` (oldest first)
///
/// Windows with no values for the metric are skipped but keep their slot on
/// the x axis, so the slope stays per window; at least two must remain.
pub fn trend(
    windows: &[MetricWindow],
    metric: MetricKind,
    settings: TrendSettings,
) -> Result<TrendResult> {
    let points: Vec<(f64, f64)> = windows
        .iter()
        .enumerate()
        .filter_map(|(i, w)| aggregate(w, metric).ok().map(|agg| (i as f64, agg.mean)))
        .collect();

    if points.len() < 2 {
        return Err(AnalysisError::insufficient(
            format!("{} trend (non-empty windows)", metric),
            2,
            points.len(),
        ));
    }

    let (slope, r_squared) = linear_fit(&points);
    let means = points.iter().map(|&(_, y)| y).collect();

    let direction = if slope.abs() < settings.epsilon {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Degrading
    } else {
        TrendDirection::Improving
    };

    Ok(TrendResult {
        metric,
        slope,
        direction,
        confidence: r_squared,
        is_confident: r_squared >= settings.confidence_floor,
        window_means: means,
    })
}

/// Least squares slope and R² of `(x, y)` points
///
/// A flat series is fully explained by a horizontal line (R² = 1).
fn linear_fit(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|&(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|&(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let r_squared = if syy > 0.0 {
        ((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0)
    } else {
        1.0
    };

    (slope, r_squared)
}
