// Analyzer module: aggregates submodules for different aspects of analysis.

pub mod aggregate;
pub mod cannibalization;
pub mod decay;
pub mod devices;
pub mod opportunities;
pub mod quality;
pub mod report;
pub mod trends;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export the main Analyzer implementation for ease of use.
pub use report::{Analyzer, AuditAnalyzer};
