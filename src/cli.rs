//! CLI argument parsing for testlens

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "testlens")]
#[command(version)]
#[command(about = "Test performance analyzer: statistics, trends, bottlenecks and anomalies", long_about = None)]
pub struct Cli {
    /// JSON files of raw test results, one run per file, oldest first
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Analysis configuration (TOML); unspecified keys keep their defaults
    #[arg(long = "config", value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Recommendation rule table (TOML) replacing the built-in rules
    #[arg(long = "rules", value_name = "TOML")]
    pub rules: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Print the report of every run instead of only the last one
    /// (as one JSON array with --format json)
    #[arg(long = "all-runs")]
    pub all_runs: bool,

    /// Exit with status 2 when the last run shows a regression or a
    /// confidently degrading trend
    #[arg(long = "fail-on-regression")]
    pub fail_on_regression: bool,

    /// Anomaly threshold in standard deviations (overrides the config file)
    #[arg(long = "sensitivity", value_name = "SIGMA")]
    pub sensitivity: Option<f64>,

    /// Append every report as one JSON line to this file
    #[arg(long = "report-log", value_name = "PATH")]
    pub report_log: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
