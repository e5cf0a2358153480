//! Test execution records
//!
//! [`RawExecutionResult`] is what test runners hand us (usually deserialized
//! from JSON). [`MetricRecord`] is the validated, immutable form owned by the
//! [`MetricStore`](crate::store::MetricStore).

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" | "ok" => Ok(Outcome::Passed),
            "failed" | "fail" | "error" => Ok(Outcome::Failed),
            "skipped" | "skip" | "ignored" => Ok(Outcome::Skipped),
            other => Err(format!("unrecognized outcome '{}'", other)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Metric carried by a record
///
/// All metrics are costs: a larger value is worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Wall-clock duration in seconds
    Duration,
    /// Memory growth in bytes
    MemoryDelta,
    /// Fraction of one CPU used (0-1)
    CpuRatio,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Duration,
        MetricKind::MemoryDelta,
        MetricKind::CpuRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Duration => "duration",
            MetricKind::MemoryDelta => "memory_delta",
            MetricKind::CpuRatio => "cpu_ratio",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Duration => "s",
            MetricKind::MemoryDelta => "B",
            MetricKind::CpuRatio => "",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unvalidated execution result as produced by a test runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExecutionResult {
    /// Test identifier
    pub test: String,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Outcome string (passed/failed/skipped and common aliases)
    pub outcome: String,
    /// Suite or phase the test belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ratio: Option<f64>,
    /// Wall-clock start in nanoseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_nanos: Option<u64>,
}

impl RawExecutionResult {
    pub fn new(test: impl Into<String>, duration_secs: f64, outcome: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            duration_secs,
            outcome: outcome.into(),
            phase: None,
            memory_bytes: None,
            cpu_ratio: None,
            timestamp_nanos: None,
        }
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_memory(mut self, bytes: i64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    pub fn with_cpu(mut self, ratio: f64) -> Self {
        self.cpu_ratio = Some(ratio);
        self
    }

    pub fn with_timestamp(mut self, timestamp_nanos: u64) -> Self {
        self.timestamp_nanos = Some(timestamp_nanos);
        self
    }
}

/// Validated, immutable sample of one test execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_delta: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ratio: Option<f64>,
    pub outcome: Outcome,
    pub timestamp_nanos: u64,
    /// Store-assigned insertion sequence number
    pub sequence: u64,
}

impl MetricRecord {
    /// Validate a raw result without assigning a sequence number yet
    ///
    /// `index` is the position inside the ingested batch, used for error reporting.
    pub(crate) fn validate(raw: &RawExecutionResult, index: usize) -> Result<PendingRecord> {
        let fail = |reason: String| AnalysisError::Validation {
            index,
            test: raw.test.clone(),
            reason,
        };

        if raw.test.trim().is_empty() {
            return Err(fail("empty test name".to_string()));
        }
        if !raw.duration_secs.is_finite() {
            return Err(fail(format!("non-finite duration {}", raw.duration_secs)));
        }
        if raw.duration_secs < 0.0 {
            return Err(fail(format!("negative duration {}", raw.duration_secs)));
        }
        let memory_delta = match raw.memory_bytes {
            Some(bytes) if bytes < 0 => {
                return Err(fail(format!("negative memory delta {}", bytes)));
            }
            Some(bytes) => Some(bytes as u64),
            None => None,
        };
        if let Some(cpu) = raw.cpu_ratio {
            if !(0.0..=1.0).contains(&cpu) {
                return Err(fail(format!("cpu ratio {} outside [0, 1]", cpu)));
            }
        }
        let outcome = raw.outcome.parse::<Outcome>().map_err(fail)?;

        Ok(PendingRecord {
            test: raw.test.clone(),
            phase: raw.phase.clone(),
            duration_secs: raw.duration_secs,
            memory_delta,
            cpu_ratio: raw.cpu_ratio,
            outcome,
            timestamp_nanos: raw.timestamp_nanos,
        })
    }

    /// Value of `metric` for this record, if it was measured
    pub fn value(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::Duration => Some(self.duration_secs),
            MetricKind::MemoryDelta => self.memory_delta.map(|b| b as f64),
            MetricKind::CpuRatio => self.cpu_ratio,
        }
    }

    /// Grouping key for phase-level analysis (falls back to the test name)
    pub fn phase_or_test(&self) -> &str {
        self.phase.as_deref().unwrap_or(&self.test)
    }
}

/// Validated record waiting for its sequence number
#[derive(Debug, Clone)]
pub(crate) struct PendingRecord {
    test: String,
    phase: Option<String>,
    duration_secs: f64,
    memory_delta: Option<u64>,
    cpu_ratio: Option<f64>,
    outcome: Outcome,
    timestamp_nanos: Option<u64>,
}

impl PendingRecord {
    pub(crate) fn seal(self, sequence: u64, now_nanos: u64) -> MetricRecord {
        MetricRecord {
            test: self.test,
            phase: self.phase,
            duration_secs: self.duration_secs,
            memory_delta: self.memory_delta,
            cpu_ratio: self.cpu_ratio,
            outcome: self.outcome,
            timestamp_nanos: self.timestamp_nanos.unwrap_or(now_nanos),
            sequence,
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
