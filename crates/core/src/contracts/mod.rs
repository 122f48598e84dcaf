//! Contracts implemented by pluggable components

pub mod analyzer;
pub mod oracle;

pub use analyzer::Analyzer;
pub use oracle::ScoringOracle;
