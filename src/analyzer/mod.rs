//! Analysis orchestration
//!
//! [`Analyzer::analyze`] ingests one run's results into the shared store,
//! then runs the stages in order over a single snapshot: aggregation,
//! trend, bottleneck, anomaly, baseline comparison and recommendation.
//!
//! Insufficient data in one stage or metric never aborts the run: it is
//! recorded as a [`StageNote`] and the corresponding output is left out.
//! Validation, configuration and time budget errors are fatal.

mod report;


pub use report::{
    AnalysisReport, BaselineSource, BaselineUse, JsonLinesSink, ReportSink, RunSummary, Stage,
    StageNote,
};

use crate::anomaly::{self, AnomalyFinding, AnomalySettings};
use crate::bottleneck::{self, ThresholdConfig};
use crate::comparison::compare_all;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::record::{now_nanos, MetricKind, RawExecutionResult};
use crate::recommendation::RuleSet;
use crate::stats::{aggregate, Aggregate};
use crate::store::{MetricStore, MetricWindow, StoreSnapshot, WindowSelector};
use crate::trend::{trend, TrendResult, TrendSettings};
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stateful driver over a shared [`MetricStore`]
///
/// Remembers the sequence range of every run it analyzed so later runs get
/// trend history and a baseline. Producers may keep ingesting into the same
/// store from other threads while an analysis is in progress.
///
/// # Example
/// ```
/// use testlens::analyzer::Analyzer;
/// use testlens::config::AnalysisConfig;
/// use testlens::record::RawExecutionResult;
/// use testlens::recommendation::RuleSet;
///
/// let mut analyzer = Analyzer::new(RuleSet::default_rules()?);
/// let report = analyzer.analyze(
///     &[
///         RawExecutionResult::new("login", 0.2, "passed"),
///         RawExecutionResult::new("checkout", 1.8, "passed"),
///     ],
///     &AnalysisConfig::default(),
/// )?;
///
/// let bottlenecks = report.bottlenecks.as_ref().unwrap();
/// assert_eq!(bottlenecks[0].subject, "checkout");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Analyzer {
    store: Arc<MetricStore>,
    rules: RuleSet,
    /// Sequence ranges of completed runs, oldest first
    runs: Vec<Range<u64>>,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl Analyzer {
    /// Analyzer over a fresh, private store
    pub fn new(rules: RuleSet) -> Self {
        Self::with_store(Arc::new(MetricStore::new()), rules)
    }

    /// Analyzer over a store shared with other producers
    pub fn with_store(store: Arc<MetricStore>, rules: RuleSet) -> Self {
        Self {
            store,
            rules,
            runs: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Number of runs analyzed to completion
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Register a consumer for finished reports
    pub fn add_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    /// Ingest `results` as one run and analyze it
    ///
    /// # Errors
    /// - [`AnalysisError::Config`] if `config` is invalid (nothing is ingested)
    /// - [`AnalysisError::Validation`] if any result is malformed (nothing is ingested)
    /// - [`AnalysisError::BudgetExceeded`] if `config.time_budget_ms` runs out
    ///   between stages; the records stay in the store but the run is not
    ///   recorded as history
    pub fn analyze(
        &mut self,
        results: &[RawExecutionResult],
        config: &AnalysisConfig,
    ) -> Result<AnalysisReport> {
        let started = Instant::now();
        config.validate().map_err(AnalysisError::Config)?;

        let range = self.store.ingest(results)?;
        let run_id = self.runs.len() + 1;
        tracing::debug!(
            run_id,
            records = results.len(),
            first_sequence = range.start,
            "run ingested"
        );

        // Only the records some stage reads: baseline history and trend runs
        let history_start = range.start.saturating_sub(config.baseline_window as u64);
        let from = self
            .trend_runs(config)
            .first()
            .map_or(history_start, |r| r.start.min(history_start));
        let snapshot = self.snapshot_covering(from..range.end);
        let batch = snapshot
            .window(&WindowSelector::Sequences(range.clone()))
            .with_label(format!("run {} ({} records)", run_id, range.end - range.start));
        let history = snapshot.window(&WindowSelector::Sequences(history_start..range.start));

        let mut run = RunState {
            started,
            budget: config.time_budget_ms.map(Duration::from_millis),
            notes: Vec::new(),
        };

        // Aggregation
        run.check_budget(Stage::Aggregation)?;
        let mut aggregates = Vec::new();
        for metric in MetricKind::ALL {
            match aggregate(&batch, metric) {
                Ok(agg) => aggregates.push(agg),
                Err(e) => run.note(Stage::Aggregation, Some(metric), e)?,
            }
        }

        // Trend over the most recent runs, this one included
        run.check_budget(Stage::Trend)?;
        let trends = self.trends(&snapshot, &batch, &aggregates, config, &mut run)?;

        // Bottlenecks
        run.check_budget(Stage::Bottleneck)?;
        let bottlenecks = bottleneck::detect(
            &batch,
            &ThresholdConfig {
                tier_boundaries: config.tier_boundaries.clone(),
                scope: config.bottleneck_scope,
            },
        );

        // Anomalies against history, falling back to the run itself
        run.check_budget(Stage::Anomaly)?;
        let (anomalies, baselines) = detect_anomalies(&batch, &history, &aggregates, config, &mut run)?;

        // Baseline comparison
        run.check_budget(Stage::Comparison)?;
        let comparison = if history.is_empty() {
            run.note(
                Stage::Comparison,
                None,
                AnalysisError::insufficient("baseline comparison (historical records)", 1, 0),
            )?;
            None
        } else {
            let mut previous = Vec::new();
            for current in &aggregates {
                match aggregate(&history, current.metric) {
                    Ok(agg) => previous.push(agg),
                    Err(_) => run.note(
                        Stage::Comparison,
                        Some(current.metric),
                        AnalysisError::insufficient(
                            format!("{} baseline comparison (historical samples)", current.metric),
                            1,
                            0,
                        ),
                    )?,
                }
            }
            Some(compare_all(
                &previous,
                &aggregates,
                &config.regression_thresholds,
            ))
        };

        // Recommendations
        run.check_budget(Stage::Recommendation)?;
        let recommendations = self
            .rules
            .generate(&bottlenecks, anomalies.as_deref().unwrap_or_default());

        let report = AnalysisReport {
            run_id,
            window: batch.descriptor(),
            summary: RunSummary::from_window(&batch),
            aggregates,
            trends,
            bottlenecks: Some(bottlenecks),
            anomalies,
            baselines,
            comparison,
            recommendations: Some(recommendations),
            skipped: run.notes,
            generated_at_nanos: now_nanos(),
            elapsed_us: started.elapsed().as_micros() as u64,
        };

        self.runs.push(range);
        tracing::info!(
            run_id,
            records = report.summary.total,
            bottlenecks = report.bottlenecks.as_ref().map_or(0, Vec::len),
            anomalies = report.anomalies.as_ref().map_or(0, Vec::len),
            recommendations = report.recommendations.as_ref().map_or(0, Vec::len),
            skipped = report.skipped.len(),
            elapsed_us = report.elapsed_us,
            "analysis complete"
        );

        self.publish(&report);
        Ok(report)
    }

    /// Snapshot of `sequences` once every sequence below its end is visible
    ///
    /// A concurrent producer that reserved a lower range may not have
    /// published yet; it does so right after reserving, so the wait is short.
    fn snapshot_covering(&self, sequences: Range<u64>) -> StoreSnapshot {
        loop {
            let snapshot = self.store.snapshot_range(sequences.clone());
            if snapshot.read_sequence() >= sequences.end {
                return snapshot;
            }
            std::thread::yield_now();
        }
    }

    /// Earlier runs that feed the trend, oldest first
    fn trend_runs(&self, config: &AnalysisConfig) -> &[Range<u64>] {
        let keep = config.trend_history.saturating_sub(1);
        &self.runs[self.runs.len().saturating_sub(keep)..]
    }

    fn trends(
        &self,
        snapshot: &StoreSnapshot,
        batch: &MetricWindow,
        aggregates: &[Aggregate],
        config: &AnalysisConfig,
        run: &mut RunState,
    ) -> Result<Option<Vec<TrendResult>>> {
        let mut windows: Vec<MetricWindow> = self
            .trend_runs(config)
            .iter()
            .map(|r| snapshot.window(&WindowSelector::Sequences(r.clone())))
            .collect();
        windows.push(batch.clone());

        let settings = TrendSettings {
            epsilon: config.trend_epsilon,
            confidence_floor: config.trend_confidence_floor,
        };

        if aggregates.is_empty() {
            run.note(
                Stage::Trend,
                None,
                AnalysisError::insufficient("trend (records in run)", 1, 0),
            )?;
        }

        let mut results = Vec::new();
        for agg in aggregates {
            match trend(&windows, agg.metric, settings) {
                Ok(result) => results.push(result),
                Err(e) => run.note(Stage::Trend, Some(agg.metric), e)?,
            }
        }

        Ok(if results.is_empty() { None } else { Some(results) })
    }

    fn publish(&self, report: &AnalysisReport) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(report) {
                tracing::warn!(sink = sink.name(), error = %e, "report sink failed");
            }
        }
    }
}

/// Per-run bookkeeping: budget clock and recoverable notes
struct RunState {
    started: Instant,
    budget: Option<Duration>,
    notes: Vec<StageNote>,
}

impl RunState {
    fn check_budget(&self, next: Stage) -> Result<()> {
        let Some(budget) = self.budget else {
            return Ok(());
        };
        let elapsed = self.started.elapsed();
        if elapsed >= budget {
            tracing::warn!(stage = %next, elapsed_ms = elapsed.as_millis() as u64, "time budget exhausted");
            return Err(AnalysisError::BudgetExceeded {
                stage: next,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Record a recoverable error, propagate anything else
    fn note(&mut self, stage: Stage, metric: Option<MetricKind>, err: AnalysisError) -> Result<()> {
        if !err.is_recoverable() {
            return Err(err);
        }
        tracing::debug!(stage = %stage, metric = ?metric, reason = %err, "stage output skipped");
        self.notes.push(StageNote {
            stage,
            metric,
            reason: err.to_string(),
        });
        Ok(())
    }
}

type AnomalyOutput = (Option<Vec<AnomalyFinding>>, Vec<BaselineUse>);

fn detect_anomalies(
    batch: &MetricWindow,
    history: &MetricWindow,
    aggregates: &[Aggregate],
    config: &AnalysisConfig,
    run: &mut RunState,
) -> Result<AnomalyOutput> {
    let settings = AnomalySettings {
        sensitivity: config.anomaly_sensitivity,
        min_baseline_samples: config.min_baseline_samples,
        tier_boundaries: config.anomaly_tier_boundaries.clone(),
    };

    let mut findings: Option<Vec<AnomalyFinding>> = None;
    let mut baselines = Vec::new();

    if aggregates.is_empty() {
        run.note(
            Stage::Anomaly,
            None,
            AnalysisError::insufficient("anomaly detection (records in run)", 1, 0),
        )?;
    }

    for current in aggregates {
        let metric = current.metric;
        let (baseline, source) = match aggregate(history, metric) {
            Ok(hist) if hist.count >= config.min_baseline_samples => {
                (hist, BaselineSource::History)
            }
            _ => (*current, BaselineSource::CurrentRun),
        };

        match anomaly::detect(batch, &baseline, &settings) {
            Ok(found) => {
                let used = BaselineUse::from_baseline(&baseline, source);
                if used.unstable {
                    tracing::debug!(metric = %metric, variation = used.variation, "unstable anomaly baseline");
                }
                baselines.push(used);
                findings.get_or_insert_with(Vec::new).extend(found);
            }
            Err(e) => run.note(Stage::Anomaly, Some(metric), e)?,
        }
    }

    // Chronological across metrics, metric order within one record
    if let Some(list) = findings.as_mut() {
        list.sort_by(|a, b| {
            (a.timestamp_nanos, a.sequence)
                .cmp(&(b.timestamp_nanos, b.sequence))
                .then_with(|| a.metric.cmp(&b.metric))
        });
    }

    Ok((findings, baselines))
}
