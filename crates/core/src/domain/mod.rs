//! Domain models for the sniffing engine

use crate::errors::StatusTransitionError;
use crate::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Well-known analysis domains
pub mod domains {
    pub const SECURITY: &str = "security";
    pub const PERFORMANCE: &str = "performance";
    pub const FUNCTIONAL: &str = "functional";
    pub const UNIT: &str = "unit";
    pub const DOCUMENTATION: &str = "documentation";
    pub const INTEGRATION: &str = "integration";

    pub const ALL: [&str; 6] = [
        SECURITY,
        PERFORMANCE,
        FUNCTIONAL,
        UNIT,
        DOCUMENTATION,
        INTEGRATION,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Lifecycle of a single (file, domain) analysis.
///
/// `Pending -> Running -> {Success, Failure, Error}`. `Error` is an
/// infrastructure or exception failure, `Failure` means the analyzer ran to
/// completion and found blocking issues, `Success` means no blocking issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Success,
    Failure,
    Error,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Success | AnalysisStatus::Failure | AnalysisStatus::Error
        )
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        match (self, next) {
            (AnalysisStatus::Pending, AnalysisStatus::Running) => true,
            // Rejected or timed out before an analyzer ever ran
            (AnalysisStatus::Pending, AnalysisStatus::Error) => true,
            (AnalysisStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Success => "success",
            AnalysisStatus::Failure => "failure",
            AnalysisStatus::Error => "error",
        }
    }

    /// Folds statuses of sibling results: any Error wins, then any Failure.
    pub fn combine<'a>(statuses: impl IntoIterator<Item = &'a AnalysisStatus>) -> AnalysisStatus {
        let mut combined = AnalysisStatus::Success;
        for status in statuses {
            match status {
                AnalysisStatus::Error => return AnalysisStatus::Error,
                AnalysisStatus::Failure => combined = AnalysisStatus::Failure,
                AnalysisStatus::Pending | AnalysisStatus::Running => {
                    return AnalysisStatus::Error
                }
                AnalysisStatus::Success => {}
            }
        }
        combined
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub file: PathBuf,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

/// A finding produced by an analyzer.
///
/// `fixed` is the only field that changes after creation and only the fix
/// pipeline sets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<IssueLocation>,
    #[serde(default)]
    pub fixed: bool,
    pub confidence: f64,
}

impl Issue {
    pub fn new(
        domain: impl Into<String>,
        issue_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            issue_type: issue_type.into(),
            severity,
            description: description.into(),
            location: None,
            fixed: false,
            confidence: 1.0,
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: usize) -> Self {
        self.location = Some(IssueLocation {
            file: file.into(),
            line,
            column: None,
        });
        self
    }

    /// Replaces the random id with a stable one so repeated runs agree
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn file(&self) -> Option<&Path> {
        self.location.as_ref().map(|l| l.file.as_path())
    }

    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().map(|l| l.line)
    }
}

/// Domain-specific outcome of `Analyzer::analyze`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub issues: Vec<Issue>,
    pub metrics: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

impl AnalysisPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn recommend(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}

/// One (file, domain) result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub file: PathBuf,
    pub domain: String,
    pub status: AnalysisStatus,
    pub issues: Vec<Issue>,
    pub metrics: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn pending(file: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            domain: domain.into(),
            status: AnalysisStatus::Pending,
            issues: Vec::new(),
            metrics: BTreeMap::new(),
            recommendations: Vec::new(),
            error: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// A result that never reached an analyzer (unknown domain, timeout, lost worker)
    pub fn errored(
        file: impl Into<PathBuf>,
        domain: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::pending(file, domain);
        result.status = AnalysisStatus::Error;
        result.error = Some(message.into());
        result
    }

    pub fn transition(&mut self, next: AnalysisStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.timestamp = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), StatusTransitionError> {
        self.transition(AnalysisStatus::Running)
    }

    /// Moves a running result to Success or Failure and takes the payload
    pub fn finish(
        &mut self,
        payload: AnalysisPayload,
        blocking: bool,
    ) -> Result<(), StatusTransitionError> {
        let next = if blocking {
            AnalysisStatus::Failure
        } else {
            AnalysisStatus::Success
        };
        self.transition(next)?;
        self.issues = payload.issues;
        self.metrics = payload.metrics;
        self.recommendations = payload.recommendations;
        Ok(())
    }

    pub fn fail_with_error(
        &mut self,
        message: impl Into<String>,
    ) -> Result<(), StatusTransitionError> {
        self.transition(AnalysisStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

/// Fan-in of every AnalysisResult for one file in one run.
///
/// Always covers every requested domain: a domain without a returned result is
/// represented by an Error result rather than left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub run_id: Uuid,
    pub file: PathBuf,
    pub domains: Vec<String>,
    pub status: AnalysisStatus,
    pub results: BTreeMap<String, AnalysisResult>,
    pub issue_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedResult {
    pub fn from_results(
        file: impl Into<PathBuf>,
        domains: &[String],
        results: Vec<AnalysisResult>,
    ) -> Self {
        let file = file.into();
        let mut by_domain: BTreeMap<String, AnalysisResult> = BTreeMap::new();
        for result in results {
            if domains.contains(&result.domain) {
                by_domain.insert(result.domain.clone(), result);
            }
        }
        for domain in domains {
            if !by_domain.contains_key(domain) {
                by_domain.insert(
                    domain.clone(),
                    AnalysisResult::errored(&file, domain, "no result returned for domain"),
                );
            }
        }

        let status = AnalysisStatus::combine(by_domain.values().map(|r| &r.status));
        let issue_count = by_domain.values().map(|r| r.issues.len()).sum();
        let mut sorted_domains: Vec<String> = domains.to_vec();
        sorted_domains.sort();
        sorted_domains.dedup();

        Self {
            run_id: Uuid::new_v4(),
            file,
            domains: sorted_domains,
            status,
            results: by_domain,
            issue_count,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Structured answer for a request that was refused before enqueueing
    pub fn rejected(
        file: impl Into<PathBuf>,
        domains: &[String],
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            file: file.into(),
            domains: domains.to_vec(),
            status: AnalysisStatus::Error,
            results: BTreeMap::new(),
            issue_count: 0,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.results.values().flat_map(|r| r.issues.iter())
    }

    pub fn domain_issue_count(&self, domain: &str) -> usize {
        self.results.get(domain).map_or(0, |r| r.issues.len())
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }
}

/// A request to analyze one file; consumed exactly once by a file worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub file: PathBuf,
    pub domains: Vec<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl AnalysisTask {
    pub fn new(file: impl Into<PathBuf>, domains: Vec<String>) -> Self {
        Self {
            file: file.into(),
            domains,
            enqueued_at: Utc::now(),
        }
    }

    /// Union of the domain sets of several tasks for the same file
    pub fn merged_domains<'a>(tasks: impl IntoIterator<Item = &'a AnalysisTask>) -> Vec<String> {
        let set: BTreeSet<&String> = tasks.into_iter().flat_map(|t| t.domains.iter()).collect();
        set.into_iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub issue_id: String,
    pub confidence: f64,
    pub suggested_change: String,
    pub description: String,
}

/// Label produced by the scoring oracle for a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// One line of the audit trail, written once per completed file run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub file: PathBuf,
    /// Comma-joined domain set of the run
    pub domain: String,
    pub status: AnalysisStatus,
    pub issue_count: usize,
    pub report_path: PathBuf,
}

impl AuditEntry {
    pub fn for_run(result: &AggregatedResult, report_path: impl Into<PathBuf>) -> Self {
        Self {
            timestamp: Utc::now(),
            file: result.file.clone(),
            domain: result.domains.join(","),
            status: result.status,
            issue_count: result.issue_count,
            report_path: report_path.into(),
        }
    }
}

/// Outcome of verifying a fix by re-sniffing the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixVerification {
    pub file: PathBuf,
    pub issues_before: usize,
    pub issues_after: usize,
    pub improved: bool,
    pub status: AnalysisStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub fixed: Vec<Issue>,
    pub failed: Vec<Issue>,
    pub suggestions: Vec<FixSuggestion>,
    pub verifications: Vec<FixVerification>,
}

/// Answer of a batch run of one domain across many files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSniffReport {
    pub domain: String,
    pub status: AnalysisStatus,
    pub results: Vec<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainSniffReport {
    pub fn rejected(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            status: AnalysisStatus::Error,
            results: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn from_results(domain: impl Into<String>, results: Vec<AnalysisResult>) -> Self {
        let status = AnalysisStatus::combine(results.iter().map(|r| &r.status));
        Self {
            domain: domain.into(),
            status,
            results,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_machine_rejects_moves_out_of_terminal_states() {
        let mut result = AnalysisResult::pending("a.py", domains::SECURITY);
        result.start().unwrap();
        result.finish(AnalysisPayload::new(), false).unwrap();
        assert_eq!(result.status, AnalysisStatus::Success);

        let err = result.transition(AnalysisStatus::Running).unwrap_err();
        assert_eq!(err.from, AnalysisStatus::Success);
        assert!(result.fail_with_error("late").is_err());
        assert_eq!(result.status, AnalysisStatus::Success);
    }

    #[test]
    fn test_pending_cannot_skip_to_success() {
        let mut result = AnalysisResult::pending("a.py", domains::UNIT);
        assert!(result.transition(AnalysisStatus::Success).is_err());
        assert!(result.transition(AnalysisStatus::Error).is_ok());
    }

    #[test]
    fn test_combine_prefers_error_then_failure() {
        use AnalysisStatus::*;
        assert_eq!(AnalysisStatus::combine(&[Success, Success]), Success);
        assert_eq!(AnalysisStatus::combine(&[Success, Failure]), Failure);
        assert_eq!(AnalysisStatus::combine(&[Failure, Error, Success]), Error);
        assert_eq!(AnalysisStatus::combine(&[Success, Running]), Error);
    }

    #[test]
    fn test_aggregate_fills_missing_domains_with_errors() {
        let domains = vec!["documentation".to_string(), "security".to_string()];
        let mut security = AnalysisResult::pending("a.py", "security");
        security.start().unwrap();
        security
            .finish(
                AnalysisPayload::new().issue(Issue::new("security", "x", Severity::Low, "d")),
                false,
            )
            .unwrap();

        let aggregated = AggregatedResult::from_results("a.py", &domains, vec![security]);
        assert_eq!(aggregated.results.len(), 2);
        assert_eq!(aggregated.status, AnalysisStatus::Error);
        assert_eq!(aggregated.issue_count, 1);
        assert_eq!(
            aggregated.results["documentation"].status,
            AnalysisStatus::Error
        );
    }

    #[test]
    fn test_issue_serializes_type_field_and_clamps_confidence() {
        let issue = Issue::new("security", "sql_injection", Severity::High, "query")
            .at("db.py", 3)
            .with_confidence(1.7);
        assert_eq!(issue.confidence, 1.0);

        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "sql_injection");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["location"]["line"], 3);
    }

    #[test]
    fn test_merged_domains_is_sorted_union() {
        let a = AnalysisTask::new("f.py", vec!["security".into(), "unit".into()]);
        let b = AnalysisTask::new("f.py", vec!["documentation".into(), "security".into()]);
        assert_eq!(
            AnalysisTask::merged_domains([&a, &b]),
            vec!["documentation", "security", "unit"]
        );
    }
}
