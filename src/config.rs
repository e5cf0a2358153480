// Configuration for an analysis run
//
// Every threshold the engine uses lives here; none are hard-coded in the
// detectors. Partial TOML files override only the keys they name.

use crate::bottleneck::BottleneckScope;
use crate::record::MetricKind;
use crate::severity::{Severity, TierBoundary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Relative-change thresholds for baseline comparison, per metric
///
/// 0.20 means "a 20% increase of the mean is a regression".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionThresholds {
    pub duration: f64,
    pub memory_delta: f64,
    pub cpu_ratio: f64,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self {
            duration: 0.20,
            memory_delta: 0.25,
            cpu_ratio: 0.20,
        }
    }
}

impl RegressionThresholds {
    pub fn for_metric(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Duration => self.duration,
            MetricKind::MemoryDelta => self.memory_delta,
            MetricKind::CpuRatio => self.cpu_ratio,
        }
    }
}

/// Configuration for an analysis run
///
/// # Example
/// ```
/// use testlens::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.anomaly_sensitivity, 3.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Share-of-total-duration tiers for bottleneck severity
    ///
    /// Default: ≥0.5 Critical, ≥0.25 High, ≥0.1 Medium, ≥0.0 Low
    pub tier_boundaries: Vec<TierBoundary>,

    /// σ-distance tiers for anomaly severity
    ///
    /// Default: ≥6 Critical, ≥5 High, ≥4 Medium, ≥0 Low
    pub anomaly_tier_boundaries: Vec<TierBoundary>,

    /// Number of standard deviations beyond which a sample is anomalous
    pub anomaly_sensitivity: f64,

    /// Baselines with fewer samples are unreliable and skip anomaly detection
    pub min_baseline_samples: usize,

    /// Slopes with a smaller magnitude are classified Stable
    pub trend_epsilon: f64,

    /// Trends with R² below this are flagged as not confident
    pub trend_confidence_floor: f64,

    /// Number of most recent runs (current included) fed to the trend analyzer
    pub trend_history: usize,

    /// Number of most recent historical records forming the anomaly baseline
    pub baseline_window: usize,

    /// Whether bottlenecks are ranked per test or per phase
    pub bottleneck_scope: BottleneckScope,

    /// Relative-change thresholds for baseline comparison
    pub regression_thresholds: RegressionThresholds,

    /// Wall-clock budget for one `analyze` call, checked between stages
    pub time_budget_ms: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tier_boundaries: vec![
                TierBoundary::new(0.5, Severity::Critical),
                TierBoundary::new(0.25, Severity::High),
                TierBoundary::new(0.1, Severity::Medium),
                TierBoundary::new(0.0, Severity::Low),
            ],
            anomaly_tier_boundaries: vec![
                TierBoundary::new(6.0, Severity::Critical),
                TierBoundary::new(5.0, Severity::High),
                TierBoundary::new(4.0, Severity::Medium),
                TierBoundary::new(0.0, Severity::Low),
            ],
            anomaly_sensitivity: 3.0,
            min_baseline_samples: 10,
            trend_epsilon: 0.01,
            trend_confidence_floor: 0.5,
            trend_history: 5,
            baseline_window: 500,
            bottleneck_scope: BottleneckScope::Test,
            regression_thresholds: RegressionThresholds::default(),
            time_budget_ms: None,
        }
    }
}

impl AnalysisConfig {
    /// Fewer, higher-confidence findings
    pub fn strict() -> Self {
        Self {
            anomaly_sensitivity: 4.0,
            min_baseline_samples: 30,
            trend_confidence_floor: 0.8,
            ..Self::default()
        }
    }

    /// Flag potential problems early, at the cost of more noise
    pub fn permissive() -> Self {
        Self {
            anomaly_sensitivity: 2.0,
            min_baseline_samples: 5,
            trend_confidence_floor: 0.3,
            ..Self::default()
        }
    }

    /// Load a configuration from a TOML file; missing keys keep their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        let config: Self = toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", path.as_ref().display())
        })?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.tier_boundaries.is_empty() {
            return Err("tier_boundaries must not be empty".to_string());
        }
        for b in &self.tier_boundaries {
            if !(0.0..=1.0).contains(&b.threshold) {
                return Err(format!(
                    "tier boundary thresholds must be in [0, 1], got {}",
                    b.threshold
                ));
            }
        }
        for b in &self.anomaly_tier_boundaries {
            if !b.threshold.is_finite() || b.threshold < 0.0 {
                return Err(format!(
                    "anomaly tier thresholds must be finite and non-negative, got {}",
                    b.threshold
                ));
            }
        }

        if !self.anomaly_sensitivity.is_finite() || self.anomaly_sensitivity <= 0.0 {
            return Err(format!(
                "anomaly_sensitivity must be positive, got {}",
                self.anomaly_sensitivity
            ));
        }

        if self.min_baseline_samples < 2 {
            return Err(format!(
                "min_baseline_samples must be >= 2 for a standard deviation, got {}",
                self.min_baseline_samples
            ));
        }

        if !self.trend_epsilon.is_finite() || self.trend_epsilon < 0.0 {
            return Err(format!(
                "trend_epsilon must be non-negative, got {}",
                self.trend_epsilon
            ));
        }

        if !(0.0..=1.0).contains(&self.trend_confidence_floor) {
            return Err(format!(
                "trend_confidence_floor must be in [0, 1], got {}",
                self.trend_confidence_floor
            ));
        }

        if self.trend_history < 2 {
            return Err(format!(
                "trend_history must be >= 2, got {}",
                self.trend_history
            ));
        }

        let t = &self.regression_thresholds;
        if [t.duration, t.memory_delta, t.cpu_ratio]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err("regression thresholds must be non-negative".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.anomaly_sensitivity, 3.0);
        assert_eq!(config.min_baseline_samples, 10);
        assert_eq!(config.tier_boundaries.len(), 4);
        assert_eq!(config.bottleneck_scope, BottleneckScope::Test);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_and_permissive_presets() {
        let strict = AnalysisConfig::strict();
        assert_eq!(strict.anomaly_sensitivity, 4.0);
        assert!(strict.validate().is_ok());

        let permissive = AnalysisConfig::permissive();
        assert_eq!(permissive.min_baseline_samples, 5);
        assert!(permissive.validate().is_ok());
    }

    #[test]
    fn test_invalid_sensitivity() {
        let config = AnalysisConfig {
            anomaly_sensitivity: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_min_baseline_samples() {
        let config = AnalysisConfig {
            min_baseline_samples: 1,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_tier_boundary() {
        let config = AnalysisConfig {
            tier_boundaries: vec![TierBoundary::new(1.5, Severity::High)],
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let empty = AnalysisConfig {
            tier_boundaries: vec![],
            ..AnalysisConfig::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_invalid_trend_settings() {
        let floor = AnalysisConfig {
            trend_confidence_floor: 2.0,
            ..AnalysisConfig::default()
        };
        assert!(floor.validate().is_err());

        let history = AnalysisConfig {
            trend_history: 1,
            ..AnalysisConfig::default()
        };
        assert!(history.validate().is_err());
    }

    #[test]
    fn test_regression_thresholds_for_metric() {
        let t = RegressionThresholds::default();
        assert_eq!(t.for_metric(MetricKind::Duration), 0.20);
        assert_eq!(t.for_metric(MetricKind::MemoryDelta), 0.25);
    }

    #[test]
    fn test_from_toml_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
anomaly_sensitivity = 2.5
bottleneck_scope = "phase"

[[tier_boundaries]]
threshold = 0.4
severity = "critical"

[[tier_boundaries]]
threshold = 0.0
severity = "low"

[regression_thresholds]
duration = 0.1
"#
        )
        .unwrap();

        let config = AnalysisConfig::from_toml(file.path()).unwrap();
        assert_eq!(config.anomaly_sensitivity, 2.5);
        assert_eq!(config.bottleneck_scope, BottleneckScope::Phase);
        assert_eq!(config.tier_boundaries.len(), 2);
        assert_eq!(config.regression_thresholds.duration, 0.1);
        assert_eq!(config.regression_thresholds.memory_delta, 0.25);
        assert_eq!(config.min_baseline_samples, 10);
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_baseline_samples = 0").unwrap();
        assert!(AnalysisConfig::from_toml(file.path()).is_err());
    }

    #[test]
    fn test_from_toml_missing_file() {
        assert!(AnalysisConfig::from_toml("/nonexistent/testlens.toml").is_err());
    }
}
