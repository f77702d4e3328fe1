// Analyzer module: change derivation, distribution summary and z-scores.

pub mod changes;
pub mod distribution;
pub mod normal;
pub mod price_analysis;
pub mod zscore;

// Re-export the main Analyzer implementation for ease of use.
pub use distribution::BinSpec;
pub use price_analysis::{Analyzer, AnalyzerImpl};
