use crate::anomaly::AnomalyFinding;
use crate::bottleneck::BottleneckFinding;
use crate::recommendation::{Finding, FindingKind, Recommendation, RuleDefinition};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(serde::Deserialize)]
struct RuleFile {
    #[serde(default = "default_severity_weight")]
    severity_weight: f64,
    rule: Vec<RuleDefinition>,
}

fn default_severity_weight() -> f64 {
    10.0
}

/// Rule table mapping finding patterns to recommendations
///
/// Extensible via configuration without recompilation.
///
/// # Example Usage
/// ```no_run
/// use testlens::recommendation::RuleSet;
///
/// let rules = RuleSet::from_toml("rules.toml")?;
/// println!("{} rules loaded", rules.rules().len());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Priority added per severity tier above Low
    severity_weight: f64,

    rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Load rule definitions from a TOML file
    ///
    /// # Errors
    /// Returns error if the file doesn't exist, has invalid TOML syntax, or
    /// contains duplicate rule ids.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read rules file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid rules file: {}", path.as_ref().display()))
    }

    /// Parse rule definitions from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleFile =
            toml::from_str(content).context("Failed to parse TOML rule definitions")?;

        if !file.severity_weight.is_finite() || file.severity_weight < 0.0 {
            anyhow::bail!(
                "severity_weight must be non-negative, got {}",
                file.severity_weight
            );
        }

        let mut seen = HashSet::new();
        for rule in &file.rule {
            if !seen.insert(rule.id.as_str()) {
                anyhow::bail!("Duplicate rule id '{}'", rule.id);
            }
            if rule.text.trim().is_empty() {
                anyhow::bail!("Rule '{}' has an empty text template", rule.id);
            }
            if !rule.base_priority.is_finite() {
                anyhow::bail!("Rule '{}' has a non-finite base_priority", rule.id);
            }
        }

        Ok(Self {
            severity_weight: file.severity_weight,
            rules: file.rule,
        })
    }

    /// Load the rule table embedded in the binary
    pub fn default_rules() -> Result<Self> {
        const DEFAULT_TOML: &str = include_str!("../../rules-default.toml");
        Self::from_toml_str(DEFAULT_TOML).context("Failed to parse embedded rules-default.toml")
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn severity_weight(&self) -> f64 {
        self.severity_weight
    }

    /// Turn detector findings into ranked recommendations
    ///
    /// Sorted by priority (descending), then rule id. The sort is stable, so
    /// equal entries keep detector order (bottlenecks by share, anomalies
    /// chronologically).
    pub fn generate(
        &self,
        bottlenecks: &[BottleneckFinding],
        anomalies: &[AnomalyFinding],
    ) -> Vec<Recommendation> {
        let findings: Vec<Finding> = bottlenecks
            .iter()
            .cloned()
            .map(Finding::Bottleneck)
            .chain(anomalies.iter().cloned().map(Finding::Anomaly))
            .collect();

        let mut recommendations = Vec::new();
        for rule in &self.rules {
            let matched: Vec<&Finding> = findings.iter().filter(|f| rule.matches(f)).collect();
            if matched.is_empty() {
                continue;
            }

            if rule.aggregate {
                recommendations.push(self.build(rule, &matched));
            } else {
                for finding in matched {
                    recommendations.push(self.build(rule, &[finding]));
                }
            }
        }

        recommendations.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        tracing::debug!(
            rules = self.rules.len(),
            recommendations = recommendations.len(),
            "recommendations generated"
        );

        recommendations
    }

    fn build(&self, rule: &RuleDefinition, matched: &[&Finding]) -> Recommendation {
        let severity = matched
            .iter()
            .map(|f| f.severity())
            .max()
            .unwrap_or(rule.min_severity);
        let boost = severity.boost_rank().unwrap_or(0) as f64 * self.severity_weight;

        Recommendation {
            rule_id: rule.id.clone(),
            text: rule.render(matched),
            severity,
            priority: rule.base_priority + boost,
            triggers: matched.iter().map(|f| (*f).clone()).collect(),
        }
    }

    /// Rules that can fire on findings of `kind`
    pub fn rules_for(&self, kind: FindingKind) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }
}
