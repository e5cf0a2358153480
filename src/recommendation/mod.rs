// Rule-driven recommendations
//
// Detector findings are matched against a declarative rule table (TOML) and
// turned into ranked, human-readable suggestions. The table ships embedded
// in the binary and can be replaced without recompiling.

mod definition;
mod registry;

pub use definition::{Direction, Finding, FindingKind, Recommendation, RuleDefinition};
pub use registry::RuleSet;

#[cfg(test)]
mod tests;
