//! Built-in analyzers for the six sniffing domains
//!
//! Each analyzer is a line-oriented heuristic over Python sources. They are
//! deliberately modest: the orchestrator only relies on the `Analyzer`
//! contract, so any of them can be replaced by a richer implementation.

pub mod documentation;
pub mod functional;
pub mod integration;
pub mod performance;
pub mod rules;
pub mod security;
pub mod source;
pub mod unit;

pub use documentation::DocumentationAnalyzer;
pub use functional::FunctionalAnalyzer;
pub use integration::IntegrationAnalyzer;
pub use performance::PerformanceAnalyzer;
pub use security::SecurityAnalyzer;
pub use unit::UnitAnalyzer;

use sniff_core::{Analyzer, AnalyzerRegistry, SniffResult};
use std::sync::Arc;

pub fn builtin_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(SecurityAnalyzer::new()),
        Arc::new(PerformanceAnalyzer::new()),
        Arc::new(FunctionalAnalyzer::new()),
        Arc::new(UnitAnalyzer::new()),
        Arc::new(DocumentationAnalyzer::new()),
        Arc::new(IntegrationAnalyzer::new()),
    ]
}

/// Registry holding one built-in analyzer per domain
pub fn builtin_registry() -> SniffResult<AnalyzerRegistry> {
    AnalyzerRegistry::from_analyzers(builtin_analyzers())
}
