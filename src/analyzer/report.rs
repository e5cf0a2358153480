// Analysis report assembled by the orchestrator
//
// Stage outputs that could not be computed are `None` and carry a matching
// `StageNote`, so "no bottlenecks found" (Some(empty)) is never confused
// with "bottleneck detection skipped" (None).

use crate::anomaly::{summarize, AnomalyFinding};
use crate::bottleneck::BottleneckFinding;
use crate::comparison::{ChangeKind, MetricChange};
use crate::record::{MetricKind, Outcome};
use crate::recommendation::Recommendation;
use crate::stats::Aggregate;
use crate::store::{MetricWindow, WindowDescriptor};
use crate::trend::{TrendDirection, TrendResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Orchestration stage, used to attribute skipped work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingestion,
    Aggregation,
    Trend,
    Bottleneck,
    Anomaly,
    Comparison,
    Recommendation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ingestion => "ingestion",
            Stage::Aggregation => "aggregation",
            Stage::Trend => "trend",
            Stage::Bottleneck => "bottleneck",
            Stage::Anomaly => "anomaly",
            Stage::Comparison => "comparison",
            Stage::Recommendation => "recommendation",
        };
        f.pad(s)
    }
}

/// Why a stage (or one metric of it) produced no output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNote {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricKind>,
    pub reason: String,
}

/// Where an anomaly baseline came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// Records ingested before this run
    History,
    /// Too little history: the run is compared against itself
    CurrentRun,
}

/// Baseline used for one metric's anomaly detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineUse {
    pub metric: MetricKind,
    pub source: BaselineSource,
    pub samples: usize,
    /// Coefficient of variation of the baseline
    pub variation: f64,
    /// Spread so wide that z-scores against it say little
    pub unstable: bool,
}

impl BaselineUse {
    /// Coefficient of variation above which a baseline is flagged unstable
    pub const UNSTABLE_VARIATION: f64 = 0.5;

    pub fn from_baseline(baseline: &Aggregate, source: BaselineSource) -> Self {
        let variation = baseline.coefficient_of_variation();
        Self {
            metric: baseline.metric,
            source,
            samples: baseline.count,
            variation,
            unstable: variation > Self::UNSTABLE_VARIATION,
        }
    }
}

/// Outcome counts and totals for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// passed / (passed + failed); `None` when nothing ran to completion
    pub pass_rate: Option<f64>,
    pub total_duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest_test: Option<String>,
    pub slowest_duration_secs: f64,
}

impl RunSummary {
    pub fn from_window(window: &MetricWindow) -> Self {
        let mut summary = Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            pass_rate: None,
            total_duration_secs: 0.0,
            slowest_test: None,
            slowest_duration_secs: 0.0,
        };

        for record in window.iter() {
            summary.total += 1;
            match record.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
            summary.total_duration_secs += record.duration_secs;
            if summary.slowest_test.is_none() || record.duration_secs > summary.slowest_duration_secs
            {
                summary.slowest_test = Some(record.test.clone());
                summary.slowest_duration_secs = record.duration_secs;
            }
        }

        let completed = summary.passed + summary.failed;
        if completed > 0 {
            summary.pass_rate = Some(summary.passed as f64 / completed as f64);
        }
        summary
    }
}

/// Result of one orchestration run
///
/// Immutable once returned; handed to [`ReportSink`]s for persistence,
/// alerting or presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// 1-based index of the run within its analyzer
    pub run_id: usize,
    pub window: WindowDescriptor,
    pub summary: RunSummary,
    /// One aggregate per metric present in the run, in metric order
    pub aggregates: Vec<Aggregate>,
    pub trends: Option<Vec<TrendResult>>,
    pub bottlenecks: Option<Vec<BottleneckFinding>>,
    pub anomalies: Option<Vec<AnomalyFinding>>,
    pub baselines: Vec<BaselineUse>,
    pub comparison: Option<Vec<MetricChange>>,
    pub recommendations: Option<Vec<Recommendation>>,
    /// Recoverable problems, one per skipped stage or metric
    pub skipped: Vec<StageNote>,
    pub generated_at_nanos: u64,
    pub elapsed_us: u64,
}

impl AnalysisReport {
    pub fn aggregate(&self, metric: MetricKind) -> Option<&Aggregate> {
        self.aggregates.iter().find(|a| a.metric == metric)
    }

    pub fn trend(&self, metric: MetricKind) -> Option<&TrendResult> {
        self.trends.as_ref()?.iter().find(|t| t.metric == metric)
    }

    /// Whether any note was recorded for `stage`
    pub fn was_skipped(&self, stage: Stage) -> bool {
        self.skipped.iter().any(|n| n.stage == stage)
    }

    pub fn has_regression(&self) -> bool {
        let degrading = self.trends.iter().flatten().any(|t| {
            t.is_confident && t.direction == TrendDirection::Degrading
        });
        let regressed = self
            .comparison
            .iter()
            .flatten()
            .any(|c| c.kind == ChangeKind::Regression);
        degrading || regressed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        let s = &self.summary;

        report.push_str(&format!(
            "=== Test Performance Analysis (run {}) ===\n",
            self.run_id
        ));
        report.push_str(&format!("Window: {}\n", self.window.label));
        report.push_str(&format!(
            "Tests: {} total, {} passed, {} failed, {} skipped",
            s.total, s.passed, s.failed, s.skipped
        ));
        if let Some(rate) = s.pass_rate {
            report.push_str(&format!(" ({:.1}% pass rate)", rate * 100.0));
        }
        report.push('\n');
        report.push_str(&format!("Total duration: {:.3}s\n", s.total_duration_secs));
        if let Some(slowest) = &s.slowest_test {
            report.push_str(&format!(
                "Slowest: {} ({:.3}s)\n",
                slowest, s.slowest_duration_secs
            ));
        }

        if !self.aggregates.is_empty() {
            report.push_str("\n📊 Statistics:\n");
            for a in &self.aggregates {
                report.push_str(&format!(
                    "  {:<12} n={:<5} mean={:.3} p50={:.3} p95={:.3} p99={:.3} σ={:.3} min={:.3} max={:.3}\n",
                    a.metric, a.count, a.mean, a.p50, a.p95, a.p99, a.stddev, a.min, a.max
                ));
            }
        }

        if let Some(trends) = &self.trends {
            report.push_str("\n📈 Trends:\n");
            for t in trends {
                report.push_str(&format!(
                    "  {:<12} {:?} (slope {:+.4}/run, R²={:.2}{})\n",
                    t.metric,
                    t.direction,
                    t.slope,
                    t.confidence,
                    if t.is_confident { "" } else { ", low confidence" }
                ));
            }
        }

        if let Some(bottlenecks) = &self.bottlenecks {
            report.push_str(&format!("\n🐢 Bottlenecks ({}):\n", bottlenecks.len()));
            for b in bottlenecks.iter().take(10) {
                report.push_str(&format!("  {}\n", b.to_report_string()));
            }
            if bottlenecks.len() > 10 {
                report.push_str(&format!("  ... and {} more\n", bottlenecks.len() - 10));
            }
        }

        if let Some(anomalies) = &self.anomalies {
            report.push_str("\n🔍 Anomalies:\n");
            for b in &self.baselines {
                report.push_str(&format!(
                    "  baseline {:<12} {:?}, n={}, cv={:.2}{}\n",
                    b.metric,
                    b.source,
                    b.samples,
                    b.variation,
                    if b.unstable { " (unstable)" } else { "" }
                ));
            }
            for line in summarize(anomalies, 10).lines() {
                report.push_str(&format!("  {}\n", line));
            }
        }

        if let Some(changes) = &self.comparison {
            if !changes.is_empty() {
                report.push_str("\n⚖️  Baseline comparison:\n");
                for c in changes {
                    report.push_str(&format!("  {}\n", c.to_report_string()));
                }
            }
        }

        if let Some(recommendations) = &self.recommendations {
            report.push_str(&format!(
                "\n💡 Recommendations ({}):\n",
                recommendations.len()
            ));
            for (i, r) in recommendations.iter().enumerate() {
                report.push_str(&format!("  {}. {}\n", i + 1, r.to_report_string()));
            }
        }

        if !self.skipped.is_empty() {
            report.push_str("\n⚠️  Skipped:\n");
            for note in &self.skipped {
                match note.metric {
                    Some(metric) => report.push_str(&format!(
                        "  - {} [{}]: {}\n",
                        note.stage, metric, note.reason
                    )),
                    None => report.push_str(&format!("  - {}: {}\n", note.stage, note.reason)),
                }
            }
        }

        report
    }
}

/// Consumer of finished reports (persistence, alerting, presentation)
///
/// Invoked after the report is fully built. Failures are logged by the
/// analyzer and never affect the returned report.
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, report: &AnalysisReport) -> anyhow::Result<()>;
}

/// Appends each report as one JSON line to a writer
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn publish(&self, report: &AnalysisReport) -> anyhow::Result<()> {
        let line = serde_json::to_string(report).context("Failed to serialize report")?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("json-lines writer poisoned"))?;
        writeln!(writer, "{}", line).context("Failed to write report line")?;
        writer.flush().context("Failed to flush report line")?;
        Ok(())
    }
}
