use crate::anomaly::AnomalyFinding;
use crate::bottleneck::BottleneckFinding;
use crate::record::MetricKind;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which detector's findings a rule looks at
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Bottleneck,
    Anomaly,
}

/// Side of the baseline an anomaly must fall on
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

/// A finding that triggered a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Finding {
    Bottleneck(BottleneckFinding),
    Anomaly(AnomalyFinding),
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Bottleneck(b) => b.severity,
            Finding::Anomaly(a) => a.severity,
        }
    }

    /// Test or phase the finding is about
    pub fn subject(&self) -> &str {
        match self {
            Finding::Bottleneck(b) => &b.subject,
            Finding::Anomaly(a) => &a.test,
        }
    }

    /// Template substitutions available for this finding
    fn placeholders(&self) -> Vec<(&'static str, String)> {
        let mut values = vec![
            ("subject", self.subject().to_string()),
            ("severity", self.severity().to_string()),
        ];
        match self {
            Finding::Bottleneck(b) => {
                values.push(("share", format!("{:.1}%", b.share * 100.0)));
                values.push(("runs", b.runs.to_string()));
                values.push(("failures", b.failures.to_string()));
                values.push(("mean", format!("{:.3}s", b.mean_duration_secs)));
            }
            Finding::Anomaly(a) => {
                values.push(("metric", a.metric.to_string()));
                values.push(("value", format_value(a.metric, a.value)));
                values.push(("deviation", format!("{:+.1}σ", a.deviation)));
                values.push(("sequence", a.sequence.to_string()));
            }
        }
        values
    }
}

fn format_value(metric: MetricKind, value: f64) -> String {
    match metric {
        MetricKind::Duration => format!("{:.3}s", value),
        MetricKind::MemoryDelta => format!("{:.0} bytes", value),
        MetricKind::CpuRatio => format!("{:.0}%", value * 100.0),
    }
}

/// Declarative rule loaded from TOML configuration
///
/// # Example TOML
/// ```toml
/// [[rule]]
/// id = "memory-spike"
/// kind = "anomaly"
/// metric = "memory_delta"
/// direction = "above"
/// text = "'{subject}' grew memory by {value} ({deviation} from baseline)."
/// base_priority = 35.0
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuleDefinition {
    /// Unique rule identifier (e.g., "dominant-test")
    pub id: String,

    pub kind: FindingKind,

    /// Lowest severity that triggers the rule (never below Low)
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_severity: Option<Severity>,

    /// Anomaly rules only: metric the anomaly must be about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricKind>,

    /// Anomaly rules only: side of the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,

    /// Bottleneck rules only: minimum share of total duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_share: Option<f64>,

    /// Bottleneck rules only: minimum failed runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_failures: Option<usize>,

    /// Emit one recommendation for all matches instead of one per match
    #[serde(default)]
    pub aggregate: bool,

    /// Text template with `{placeholder}` substitutions
    pub text: String,

    pub base_priority: f64,
}

fn default_min_severity() -> Severity {
    Severity::Low
}

impl RuleDefinition {
    /// Check whether `finding` satisfies every predicate of this rule
    pub fn matches(&self, finding: &Finding) -> bool {
        let severity = finding.severity();
        if severity < self.min_severity.max(Severity::Low) {
            return false;
        }
        if self.max_severity.is_some_and(|max| severity > max) {
            return false;
        }

        match (self.kind, finding) {
            (FindingKind::Bottleneck, Finding::Bottleneck(b)) => {
                self.min_share.map_or(true, |min| b.share >= min)
                    && self.min_failures.map_or(true, |min| b.failures >= min)
            }
            (FindingKind::Anomaly, Finding::Anomaly(a)) => {
                let metric_ok = self.metric.map_or(true, |m| m == a.metric);
                let direction_ok = match self.direction {
                    Some(Direction::Above) => a.deviation > 0.0,
                    Some(Direction::Below) => a.deviation < 0.0,
                    None => true,
                };
                metric_ok && direction_ok
            }
            _ => false,
        }
    }

    /// Render the text template for one or more matched findings
    ///
    /// Per-finding placeholders resolve against the first finding;
    /// `{count}` and `{subjects}` cover all of them. Substituted values are
    /// never rescanned, and unknown `{name}` tokens are kept verbatim.
    pub fn render(&self, findings: &[&Finding]) -> String {
        let mut subjects: Vec<&str> = Vec::new();
        for finding in findings {
            if !subjects.contains(&finding.subject()) {
                subjects.push(finding.subject());
            }
        }

        let mut values: HashMap<&str, String> = HashMap::new();
        if let Some(first) = findings.first() {
            values.extend(first.placeholders());
        }
        values.insert("count", findings.len().to_string());
        values.insert("subjects", subjects.join(", "));

        let mut text = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let token = &rest[open..];
            match token[1..].find('}') {
                Some(close) => match values.get(&token[1..=close]) {
                    Some(value) => {
                        text.push_str(value);
                        rest = &token[close + 2..];
                    }
                    None => {
                        text.push('{');
                        rest = &token[1..];
                    }
                },
                None => {
                    text.push_str(token);
                    rest = "";
                }
            }
        }
        text.push_str(rest);
        text
    }
}

/// Actionable suggestion produced by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rule_id: String,
    pub text: String,
    /// Highest severity among the triggers
    pub severity: Severity,
    pub priority: f64,
    pub triggers: Vec<Finding>,
}

impl Recommendation {
    pub fn to_report_string(&self) -> String {
        format!(
            "[{:>5.1}] ({}) {}",
            self.priority, self.rule_id, self.text
        )
    }
}
