//! Core domain models and contracts for the sniffing engine
//!
//! This crate contains the layer every other crate builds on:
//! - Data model: Issue, AnalysisResult, AggregatedResult, AnalysisTask, FixSuggestion, AuditEntry
//! - Contracts: Analyzer (one per domain), ScoringOracle (AI issue classifier)
//! - AnalyzerRegistry: read-only domain -> analyzer map frozen at startup
//! - Error taxonomy shared across the orchestrator boundary

pub mod contracts;
pub mod domain;
pub mod errors;
pub mod registry;

pub use contracts::*;
pub use domain::*;
pub use errors::*;
pub use registry::{AnalyzerRegistry, AnalyzerRegistryBuilder};

/// Re-export common types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;
