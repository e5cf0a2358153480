use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use testlens::analyzer::{AnalysisReport, Analyzer, JsonLinesSink};
use testlens::cli::{Cli, OutputFormat};
use testlens::config::AnalysisConfig;
use testlens::record::RawExecutionResult;
use testlens::recommendation::RuleSet;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_toml(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(sigma) = args.sensitivity {
        config.anomaly_sensitivity = sigma;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid --sensitivity")?;
    }
    Ok(config)
}

fn load_rules(args: &Cli) -> Result<RuleSet> {
    match &args.rules {
        Some(path) => RuleSet::from_toml(path),
        None => RuleSet::default_rules(),
    }
}

fn load_run(path: &Path) -> Result<Vec<RawExecutionResult>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test results: {}", path.display()))
}

/// Exit status when `--fail-on-regression` trips
const REGRESSION_EXIT_CODE: i32 = 2;

/// Print the collected reports; `as_array` wraps JSON output in one array
fn print_reports(reports: &[AnalysisReport], format: OutputFormat, as_array: bool) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let texts: Vec<String> = reports.iter().map(|r| r.to_report_string()).collect();
            print!("{}", texts.join("\n"));
        }
        OutputFormat::Json if as_array => println!(
            "{}",
            serde_json::to_string_pretty(reports).context("Failed to serialize reports")?
        ),
        OutputFormat::Json => {
            for report in reports {
                println!("{}", report.to_json().context("Failed to serialize report")?);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let mut analyzer = Analyzer::new(load_rules(&args)?);

    if let Some(path) = &args.report_log {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open report log: {}", path.display()))?;
        analyzer.add_sink(Box::new(JsonLinesSink::new(file)));
    }

    let mut reports = Vec::new();
    for path in &args.inputs {
        let results = load_run(path)?;
        tracing::debug!(input = %path.display(), results = results.len(), "loaded run");

        let report = analyzer
            .analyze(&results, &config)
            .with_context(|| format!("Analysis failed for {}", path.display()))?;
        if !args.all_runs {
            reports.clear();
        }
        reports.push(report);
    }

    print_reports(&reports, args.format, args.all_runs)?;

    let regressed = reports.last().is_some_and(AnalysisReport::has_regression);
    if args.fail_on_regression && regressed {
        tracing::debug!("regression detected, exiting with {}", REGRESSION_EXIT_CODE);
        std::io::stdout().flush().context("Failed to flush report")?;
        std::process::exit(REGRESSION_EXIT_CODE);
    }

    Ok(())
}
