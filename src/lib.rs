//! testlens - Test performance analysis engine
//!
//! This library ingests test execution results into a concurrently writable
//! store and turns them into statistics, trends, bottleneck and anomaly
//! findings, and ranked recommendations.

pub mod analyzer;
pub mod anomaly;
pub mod bottleneck;
pub mod cli;
pub mod comparison;
pub mod config;
pub mod error;
pub mod recommendation;
pub mod record;
pub mod severity;
pub mod stats;
pub mod store;
pub mod trend;

pub use error::{AnalysisError, Result};
