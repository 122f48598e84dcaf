//! Error taxonomy for the sniffing engine

use crate::domain::AnalysisStatus;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Raised inside an analyzer; contained at the per-domain worker boundary
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Unsupported file type: {0}")]
    Unsupported(PathBuf),

    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Fix failed for {path}: {reason}")]
    FixFailed { path: PathBuf, reason: String },
}

impl AnalyzerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raised by a ScoringOracle; always degraded to a pass-through at the boundary
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Scoring oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Scoring oracle inference failed: {0}")]
    Inference(String),

    #[error("Scoring oracle timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal status transition {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

/// Errors crossing the orchestrator boundary
#[derive(Debug, Error)]
pub enum SniffError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Analyzer error in {domain}: {source}")]
    Analyzer {
        domain: String,
        #[source]
        source: AnalyzerError,
    },

    #[error(transparent)]
    OracleUnavailable(#[from] OracleError),

    #[error("Infrastructure error during {operation}: {reason}")]
    Infrastructure { operation: String, reason: String },

    #[error("Sniffing loop is stopped")]
    Stopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SniffError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn infrastructure(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Infrastructure {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Analyzer { .. } => "analyzer",
            Self::OracleUnavailable(_) => "oracle_unavailable",
            Self::Infrastructure { .. } => "infrastructure",
            Self::Stopped => "stopped",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Analyzer { .. } => true,
            Self::OracleUnavailable(_) => true,
            Self::Infrastructure { .. } => true,
            Self::Stopped => true,
            Self::Internal(_) => false,
        }
    }
}

pub type SniffResult<T> = Result<T, SniffError>;
