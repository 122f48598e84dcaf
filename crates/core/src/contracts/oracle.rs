//! Scoring oracle contract: the AI issue classifier and fix suggester

use crate::domain::{Classification, FixSuggestion, Issue};
use crate::errors::OracleError;
use async_trait::async_trait;

/// Frozen model consumed through `{text -> (label, confidence)}`.
///
/// Implementations must not mutate the issues they are given.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, text: &str) -> Result<Classification, OracleError>;

    async fn suggest(&self, issue: &Issue) -> Result<FixSuggestion, OracleError>;
}
