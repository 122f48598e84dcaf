//! Integration domain: outbound calls and process boundaries

use crate::rules::{code_lines, RuleSet};
use crate::source::read_source;
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Severity};
use std::path::Path;

pub struct IntegrationAnalyzer {
    rules: RuleSet,
}

impl Default for IntegrationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationAnalyzer {
    pub fn new() -> Self {
        let rules = RuleSet::new(domains::INTEGRATION)
            .rule_unless(
                "missing_timeout",
                Severity::Medium,
                r"\b(requests|httpx)\.(get|post|put|patch|delete|head|request)\s*\(",
                "timeout",
                "HTTP call without a timeout can hang forever",
            )
            .rule_unless(
                "missing_timeout",
                Severity::Medium,
                r"\burlopen\s*\(",
                "timeout",
                "urlopen without a timeout can hang forever",
            )
            .rule_unless(
                "unchecked_subprocess",
                Severity::Low,
                r"\bsubprocess\.run\s*\(",
                "check=",
                "subprocess.run result is not checked",
            )
            .rule(
                "hardcoded_endpoint",
                Severity::Low,
                r"https?://(localhost|127\.0\.0\.1|0\.0\.0\.0)(:\d+)?",
                "Endpoint hardcoded to a local address",
            )
            .rule(
                "unchecked_response",
                Severity::Low,
                r"\brequests\.\w+\(.*\)\.json\(\)",
                "Response body decoded without checking the status",
            );
        Self { rules }
    }
}

impl Analyzer for IntegrationAnalyzer {
    fn domain(&self) -> &str {
        domains::INTEGRATION
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        let issues = self.rules.scan(file, &source);
        let outbound_calls = code_lines(&source)
            .filter(|(_, l)| l.contains("requests.") || l.contains("httpx.") || l.contains("urlopen("))
            .count();

        let mut payload = AnalysisPayload::new().metric("outbound_calls", outbound_calls as f64);
        if issues.iter().any(|i| i.issue_type == "missing_timeout") {
            payload = payload.recommend("Pass an explicit timeout to every outbound call");
        }
        payload.issues = issues;
        Ok(payload)
    }
}
