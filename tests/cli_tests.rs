// CLI integration tests: JSON runs in, reports out

use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_run(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn uniform_run(duration: f64) -> String {
    let entries: Vec<String> = (0..4)
        .map(|i| {
            format!(
                r#"{{"test": "suite::case_{}", "duration_secs": {}, "outcome": "passed"}}"#,
                i, duration
            )
        })
        .collect();
    format!("[{}]", entries.join(","))
}

const SINGLE_RUN: &str = r#"[
    {"test": "db::migrate", "duration_secs": 4.2, "outcome": "passed", "phase": "setup"},
    {"test": "api::login", "duration_secs": 0.3, "outcome": "ok", "memory_bytes": 2048},
    {"test": "api::checkout", "duration_secs": 1.1, "outcome": "FAILED", "cpu_ratio": 0.9},
    {"test": "api::search", "duration_secs": 0.0, "outcome": "skipped"}
]"#;

#[test]
fn test_text_report_for_single_run() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run1.json", SINGLE_RUN);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&run);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test Performance Analysis (run 1)"))
        .stdout(predicate::str::contains("4 total, 2 passed, 1 failed, 1 skipped"))
        .stdout(predicate::str::contains("db::migrate"))
        .stdout(predicate::str::contains("dominant-test"))
        .stdout(predicate::str::contains("Skipped"));
}

#[test]
fn test_json_report_is_machine_readable() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run1.json", SINGLE_RUN);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    let output = cmd.arg("--format").arg("json").arg(&run).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["run_id"], 1);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["bottlenecks"][0]["subject"], "db::migrate");
    assert!(report["trends"].is_null());
    assert!(report["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["stage"] == "trend"));
}

#[test]
fn test_runs_are_analyzed_in_order() {
    let tmp = TempDir::new().unwrap();
    let runs: Vec<PathBuf> = [1.0, 2.0, 3.0]
        .iter()
        .enumerate()
        .map(|(i, d)| write_run(tmp.path(), &format!("run{}.json", i), &uniform_run(*d)))
        .collect();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    let output = cmd
        .arg("--format")
        .arg("json")
        .args(&runs)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["run_id"], 3);
    let duration = report["trends"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["metric"] == "duration")
        .unwrap();
    assert_eq!(duration["direction"], "degrading");
    assert_eq!(report["comparison"][0]["kind"], "regression");
}

#[test]
fn test_all_runs_prints_every_report() {
    let tmp = TempDir::new().unwrap();
    let first = write_run(tmp.path(), "a.json", &uniform_run(1.0));
    let second = write_run(tmp.path(), "b.json", &uniform_run(1.0));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--all-runs").arg(&first).arg(&second);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("(run 1)"))
        .stdout(predicate::str::contains("(run 2)"));
}

#[test]
fn test_all_runs_json_is_one_array() {
    let tmp = TempDir::new().unwrap();
    let first = write_run(tmp.path(), "a.json", &uniform_run(1.0));
    let second = write_run(tmp.path(), "b.json", &uniform_run(2.0));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    let output = cmd
        .arg("--all-runs")
        .arg("--format")
        .arg("json")
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    let run_ids: Vec<u64> = reports.iter().map(|r| r["run_id"].as_u64().unwrap()).collect();
    assert_eq!(run_ids, vec![1, 2]);
}

#[test]
fn test_fail_on_regression_exit_code() {
    let tmp = TempDir::new().unwrap();
    let first = write_run(tmp.path(), "a.json", &uniform_run(1.0));
    let slower = write_run(tmp.path(), "b.json", &uniform_run(2.0));
    let same = write_run(tmp.path(), "c.json", &uniform_run(1.0));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--fail-on-regression").arg(&first).arg(&slower);
    cmd.assert()
        .failure()
        .code(2)
        .stdout(predicate::str::contains("(run 2)"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--fail-on-regression").arg(&first).arg(&same);
    cmd.assert().success();

    // Without the flag a regression is only reported
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&first).arg(&slower);
    cmd.assert().success();
}

#[test]
fn test_only_last_report_by_default() {
    let tmp = TempDir::new().unwrap();
    let first = write_run(tmp.path(), "a.json", &uniform_run(1.0));
    let second = write_run(tmp.path(), "b.json", &uniform_run(1.0));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&first).arg(&second);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("(run 1)").not())
        .stdout(predicate::str::contains("(run 2)"));
}

#[test]
fn test_invalid_record_fails() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(
        tmp.path(),
        "bad.json",
        r#"[{"test": "t", "duration_secs": -1.0, "outcome": "passed"}]"#,
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&run);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("negative duration"));
}

#[test]
fn test_unknown_outcome_fails() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(
        tmp.path(),
        "bad.json",
        r#"[{"test": "t", "duration_secs": 1.0, "outcome": "exploded"}]"#,
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&run);
    cmd.assert().failure().stderr(predicate::str::contains("exploded"));
}

#[test]
fn test_missing_input_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("/nonexistent/run.json");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read input file"));
}

#[test]
fn test_malformed_json() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "broken.json", "[{\"test\": ");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg(&run);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse test results"));
}

#[test]
fn test_config_file_and_sensitivity_override() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run.json", SINGLE_RUN);
    let config = write_run(
        tmp.path(),
        "analysis.toml",
        "min_baseline_samples = 2\nbottleneck_scope = \"phase\"\n",
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    let output = cmd
        .arg("--config")
        .arg(&config)
        .arg("--sensitivity")
        .arg("1.5")
        .arg("--format")
        .arg("json")
        .arg(&run)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // Grouped by phase: db::migrate is the only record with one
    assert_eq!(report["bottlenecks"][0]["subject"], "setup");
    assert!(report["anomalies"].is_array());
}

#[test]
fn test_invalid_sensitivity_rejected() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run.json", SINGLE_RUN);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--sensitivity").arg("0").arg(&run);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("anomaly_sensitivity"));
}

#[test]
fn test_custom_rules_file() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run.json", SINGLE_RUN);
    let rules = write_run(
        tmp.path(),
        "rules.toml",
        r#"
[[rule]]
id = "custom-split"
kind = "bottleneck"
min_severity = "critical"
text = "Split {subject} ({share})"
base_priority = 99.0
"#,
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--rules").arg(&rules).arg(&run);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("custom-split"))
        .stdout(predicate::str::contains("Split db::migrate"))
        .stdout(predicate::str::contains("dominant-test").not());
}

#[test]
fn test_report_log_appends_json_lines() {
    let tmp = TempDir::new().unwrap();
    let first = write_run(tmp.path(), "a.json", &uniform_run(1.0));
    let second = write_run(tmp.path(), "b.json", &uniform_run(2.0));
    let log = tmp.path().join("reports.jsonl");

    for _ in 0..2 {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
        cmd.arg("--report-log")
            .arg(&log)
            .arg(&first)
            .arg(&second)
            .assert()
            .success();
    }

    let content = fs::read_to_string(&log).unwrap();
    let run_ids: Vec<u64> = content
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["run_id"].as_u64().unwrap())
        .collect();
    assert_eq!(run_ids, vec![1, 2, 1, 2]);
}

#[test]
fn test_debug_logs_to_stderr() {
    let tmp = TempDir::new().unwrap();
    let run = write_run(tmp.path(), "run.json", SINGLE_RUN);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.arg("--debug").arg(&run);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("analysis complete"));
}

#[test]
fn test_requires_input() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("testlens");
    cmd.assert().failure();
}
