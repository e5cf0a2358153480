// Recommendation rule matching and ranking
//
// Covers the embedded rule table against realistic detector output and the
// ordering contract (priority descending, rule id, then detector order).

use super::*;
use crate::anomaly::AnomalyFinding;
use crate::bottleneck::BottleneckFinding;
use crate::record::MetricKind;
use crate::severity::Severity;
use crate::stats::Aggregate;

fn bottleneck(subject: &str, share: f64, severity: Severity, failures: usize) -> BottleneckFinding {
    BottleneckFinding {
        subject: subject.to_string(),
        share,
        severity,
        runs: 4,
        failures,
        total_duration_secs: share * 100.0,
        mean_duration_secs: share * 25.0,
    }
}

fn anomaly(test: &str, metric: MetricKind, deviation: f64, severity: Severity) -> AnomalyFinding {
    AnomalyFinding {
        test: test.to_string(),
        sequence: 7,
        timestamp_nanos: 7,
        metric,
        value: 2.0 + deviation * 0.5,
        deviation,
        severity,
        baseline: Aggregate {
            metric,
            count: 50,
            mean: 2.0,
            p50: 2.0,
            p95: 2.8,
            p99: 3.0,
            stddev: 0.5,
            min: 1.0,
            max: 3.2,
        },
    }
}

fn ids(recs: &[Recommendation]) -> Vec<&str> {
    recs.iter().map(|r| r.rule_id.as_str()).collect()
}

#[test]
fn test_default_rules_load() {
    let rules = RuleSet::default_rules().unwrap();
    assert!(rules.rules().len() >= 6);
    assert_eq!(rules.severity_weight(), 10.0);
    assert!(rules.rules_for(FindingKind::Bottleneck).count() >= 2);
    assert!(rules
        .rules_for(FindingKind::Anomaly)
        .all(|r| r.kind == FindingKind::Anomaly));
}

#[test]
fn test_critical_bottleneck_ranked_first() {
    let rules = RuleSet::default_rules().unwrap();
    let recs = rules.generate(
        &[bottleneck("checkout", 0.8, Severity::Critical, 0)],
        &[anomaly("login", MetricKind::Duration, 3.2, Severity::Low)],
    );

    assert_eq!(ids(&recs), vec!["dominant-test", "slow-outlier"]);
    // 60 base + 3 tiers * 10
    assert_eq!(recs[0].priority, 90.0);
    assert!(recs[0].text.contains("'checkout'"));
    assert!(recs[0].text.contains("80.0%"));
    assert_eq!(recs[1].priority, 30.0);
}

#[test]
fn test_negligible_findings_never_trigger() {
    let rules = RuleSet::default_rules().unwrap();
    let recs = rules.generate(
        &[bottleneck("tiny", 0.01, Severity::Negligible, 3)],
        &[anomaly("x", MetricKind::Duration, 3.5, Severity::Negligible)],
    );
    assert!(recs.is_empty());
}

#[test]
fn test_max_severity_keeps_tiers_exclusive() {
    let rules = RuleSet::default_rules().unwrap();
    let medium = rules.generate(&[bottleneck("a", 0.15, Severity::Medium, 0)], &[]);
    assert_eq!(ids(&medium), vec!["slow-test"]);

    let high = rules.generate(&[bottleneck("a", 0.3, Severity::High, 0)], &[]);
    assert_eq!(ids(&high), vec!["dominant-test"]);
}

#[test]
fn test_failing_bottleneck_rule() {
    let rules = RuleSet::default_rules().unwrap();
    let recs = rules.generate(&[bottleneck("flaky", 0.3, Severity::High, 2)], &[]);

    assert_eq!(ids(&recs), vec!["dominant-test", "failing-bottleneck"]);
    let failing = &recs[1];
    assert!(failing.text.contains("2 of 4 runs"));
}

#[test]
fn test_anomaly_direction_and_metric() {
    let rules = RuleSet::default_rules().unwrap();
    let recs = rules.generate(
        &[],
        &[
            anomaly("leaky", MetricKind::MemoryDelta, 4.0, Severity::Medium),
            anomaly("cached", MetricKind::Duration, -3.5, Severity::Low),
        ],
    );

    assert_eq!(ids(&recs), vec!["memory-spike", "unexpectedly-fast"]);
    assert!(recs[0].text.contains("+4.0σ"));
    assert!(recs[1].text.contains("-3.5σ"));
}

#[test]
fn test_aggregate_rule_collects_all_matches() {
    let rules = RuleSet::default_rules().unwrap();
    let recs = rules.generate(
        &[],
        &[
            anomaly("a", MetricKind::Duration, 4.5, Severity::Medium),
            anomaly("b", MetricKind::Duration, 5.5, Severity::High),
            anomaly("a", MetricKind::Duration, 4.2, Severity::Medium),
        ],
    );

    let widespread = recs
        .iter()
        .find(|r| r.rule_id == "widespread-slowdown")
        .unwrap();
    assert_eq!(widespread.triggers.len(), 3);
    assert_eq!(widespread.severity, Severity::High);
    assert!(widespread.text.starts_with("3 executions"));
    assert!(widespread.text.contains("(a, b)"));

    // Per-finding rule still fires once per anomaly
    assert_eq!(
        recs.iter().filter(|r| r.rule_id == "slow-outlier").count(),
        3
    );
}

#[test]
fn test_ties_broken_by_rule_id_then_detector_order() {
    let toml = r#"
severity_weight = 0.0

[[rule]]
id = "b-rule"
kind = "bottleneck"
text = "b {subject}"
base_priority = 10.0

[[rule]]
id = "a-rule"
kind = "bottleneck"
text = "a {subject}"
base_priority = 10.0
"#;
    let rules = RuleSet::from_toml_str(toml).unwrap();
    let recs = rules.generate(
        &[
            bottleneck("first", 0.6, Severity::Critical, 0),
            bottleneck("second", 0.4, Severity::High, 0),
        ],
        &[],
    );

    let texts: Vec<&str> = recs.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["a first", "a second", "b first", "b second"]);
}

#[test]
fn test_duplicate_rule_ids_rejected() {
    let toml = r#"
[[rule]]
id = "same"
kind = "anomaly"
text = "x"
base_priority = 1.0

[[rule]]
id = "same"
kind = "bottleneck"
text = "y"
base_priority = 2.0
"#;
    let err = RuleSet::from_toml_str(toml).unwrap_err();
    assert!(err.to_string().contains("Duplicate rule id"));
}

#[test]
fn test_empty_template_rejected() {
    let toml = r#"
[[rule]]
id = "blank"
kind = "anomaly"
text = "  "
base_priority = 1.0
"#;
    assert!(RuleSet::from_toml_str(toml).is_err());
}

#[test]
fn test_min_share_predicate() {
    let toml = r#"
[[rule]]
id = "big"
kind = "bottleneck"
min_share = 0.5
text = "{subject} {share}"
base_priority = 1.0
"#;
    let rules = RuleSet::from_toml_str(toml).unwrap();
    let recs = rules.generate(
        &[
            bottleneck("huge", 0.7, Severity::Critical, 0),
            bottleneck("small", 0.2, Severity::Medium, 0),
        ],
        &[],
    );
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].text, "huge 70.0%");
}

#[test]
fn test_braces_in_subject_are_not_substituted() {
    let toml = r#"
[[rule]]
id = "split"
kind = "bottleneck"
text = "'{subject}' takes {share} over {runs} runs ({unknown})"
base_priority = 1.0
"#;
    let rules = RuleSet::from_toml_str(toml).unwrap();
    let recs = rules.generate(&[bottleneck("param[{share}-{runs}]", 0.5, Severity::Critical, 0)], &[]);

    assert_eq!(
        recs[0].text,
        "'param[{share}-{runs}]' takes 50.0% over 4 runs ({unknown})"
    );
}

#[test]
fn test_from_toml_missing_file() {
    assert!(RuleSet::from_toml("/nonexistent/rules.toml").is_err());
}

#[test]
fn test_finding_serializes_with_kind_tag() {
    let finding = Finding::Bottleneck(bottleneck("x", 0.5, Severity::Critical, 0));
    let json = serde_json::to_string(&finding).unwrap();
    assert!(json.contains(r#""kind":"bottleneck""#));
}
