//! Analyzer contract: one implementation per analysis domain

use crate::domain::{AnalysisPayload, AnalysisResult, Issue, Severity};
use crate::errors::AnalyzerError;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Contract every domain analyzer implements.
///
/// Analyzers are synchronous: the sniffing loop runs them on a bounded
/// blocking pool so they can shell out or read files freely. `analyze` must
/// not mutate shared state; `fix_issues` is the only operation allowed to
/// write the analyzed file.
pub trait Analyzer: Send + Sync {
    /// Stable key used for registry lookup and reporting
    fn domain(&self) -> &str;

    /// Pure computation over the target file
    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError>;

    /// Whether an issue blocks the file (turns Success into Failure)
    fn is_blocking(&self, issue: &Issue) -> bool {
        issue.severity == Severity::High
    }

    /// Runs `analyze` and folds the outcome into a terminal AnalysisResult.
    /// Never propagates analyzer errors: they become status Error.
    fn sniff(&self, file: &Path) -> AnalysisResult {
        let started = Instant::now();
        let mut result = AnalysisResult::pending(file, self.domain());

        let transition = result.start().and_then(|_| match self.analyze(file) {
            Ok(payload) => {
                let blocking = payload.issues.iter().any(|issue| self.is_blocking(issue));
                debug!(
                    domain = %self.domain(),
                    file = %file.display(),
                    issues = payload.issues.len(),
                    blocking,
                    "Analysis finished"
                );
                result.finish(payload, blocking)
            }
            Err(e) => {
                warn!(domain = %self.domain(), file = %file.display(), error = %e, "Analyzer failed");
                result.fail_with_error(e.to_string())
            }
        });

        if let Err(e) = transition {
            error!(domain = %self.domain(), file = %file.display(), error = %e, "Analyzer produced an invalid state");
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Attempts to remediate the issues this analyzer recognizes, setting
    /// `fixed` on each one it repaired. Returns whether anything was fixed.
    fn fix_issues(&self, _file: &Path, _issues: &mut [Issue]) -> Result<bool, AnalyzerError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnalysisStatus;

    struct FixedAnalyzer {
        severity: Option<Severity>,
    }

    impl Analyzer for FixedAnalyzer {
        fn domain(&self) -> &str {
            "functional"
        }

        fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
            match self.severity {
                Some(severity) => Ok(AnalysisPayload::new()
                    .issue(Issue::new("functional", "check", severity, "found").at(file, 1))
                    .metric("lines", 10.0)),
                None => Err(AnalyzerError::Failed("boom".into())),
            }
        }
    }

    #[test]
    fn test_sniff_maps_high_severity_to_failure() {
        let analyzer = FixedAnalyzer {
            severity: Some(Severity::High),
        };
        let result = analyzer.sniff(Path::new("x.py"));
        assert_eq!(result.status, AnalysisStatus::Failure);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.metrics["lines"], 10.0);
    }

    #[test]
    fn test_sniff_allows_warnings_on_success() {
        let analyzer = FixedAnalyzer {
            severity: Some(Severity::Medium),
        };
        let result = analyzer.sniff(Path::new("x.py"));
        assert_eq!(result.status, AnalysisStatus::Success);
        assert_eq!(result.issues.len(), 1);
    }

    #[test]
    fn test_sniff_contains_analyzer_errors() {
        let analyzer = FixedAnalyzer { severity: None };
        let result = analyzer.sniff(Path::new("x.py"));
        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.error.as_deref(), Some("Analysis failed: boom"));
    }

    #[test]
    fn test_default_fix_is_noop() {
        let analyzer = FixedAnalyzer { severity: None };
        let mut issues = vec![Issue::new("functional", "check", Severity::Low, "d")];
        assert!(!analyzer.fix_issues(Path::new("x.py"), &mut issues).unwrap());
        assert!(!issues[0].fixed);
    }
}
