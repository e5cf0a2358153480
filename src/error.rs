//! Error taxonomy for the analysis engine
//!
//! Validation and configuration problems are fatal and abort an analysis run.
//! Insufficient data is recoverable: the orchestrator turns it into a
//! [`StageNote`](crate::analyzer::StageNote) and keeps going.

use crate::analyzer::Stage;
use thiserror::Error;

/// Errors raised by the store, the statistical components and the orchestrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid record #{index} ({test}): {reason}")]
    Validation {
        index: usize,
        test: String,
        reason: String,
    },

    #[error("Insufficient data for {what}: need at least {required}, got {available}")]
    InsufficientData {
        what: String,
        required: usize,
        available: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Time budget exhausted before {stage} ({elapsed_ms} ms elapsed)")]
    BudgetExceeded { stage: Stage, elapsed_ms: u64 },
}

impl AnalysisError {
    pub(crate) fn insufficient(what: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            what: what.into(),
            required,
            available,
        }
    }

    /// Whether the orchestrator may record this error and continue the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
