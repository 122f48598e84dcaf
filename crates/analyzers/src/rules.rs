//! Line-oriented regex rules shared by the built-in analyzers

use regex::Regex;
use sniff_core::{Issue, Severity};
use std::path::Path;
use tracing::warn;

pub struct PatternRule {
    pub issue_type: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub confidence: f64,
    regex: Regex,
    /// Suppresses the match when the line also contains this text
    unless: Option<&'static str>,
}

impl PatternRule {
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line) && !self.unless.is_some_and(|text| line.contains(text))
    }
}

/// Compiles a pattern used outside a RuleSet, logging instead of failing
pub fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| warn!(pattern, error = %e, "Invalid pattern"))
        .ok()
}

/// Ordered set of rules for one domain.
///
/// Patterns that fail to compile are logged and skipped so one bad rule never
/// disables the rest of the analyzer.
pub struct RuleSet {
    domain: &'static str,
    rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            rules: Vec::new(),
        }
    }

    pub fn rule(
        self,
        issue_type: &'static str,
        severity: Severity,
        pattern: &str,
        description: &'static str,
    ) -> Self {
        self.rule_with_confidence(issue_type, severity, pattern, description, 0.9)
    }

    pub fn rule_with_confidence(
        mut self,
        issue_type: &'static str,
        severity: Severity,
        pattern: &str,
        description: &'static str,
        confidence: f64,
    ) -> Self {
        self.push(issue_type, severity, pattern, description, confidence, None);
        self
    }

    /// Rule that only fires when `unless` does not appear on the matched line
    pub fn rule_unless(
        mut self,
        issue_type: &'static str,
        severity: Severity,
        pattern: &str,
        unless: &'static str,
        description: &'static str,
    ) -> Self {
        self.push(issue_type, severity, pattern, description, 0.8, Some(unless));
        self
    }

    fn push(
        &mut self,
        issue_type: &'static str,
        severity: Severity,
        pattern: &str,
        description: &'static str,
        confidence: f64,
        unless: Option<&'static str>,
    ) {
        match Regex::new(pattern) {
            Ok(regex) => self.rules.push(PatternRule {
                issue_type,
                severity,
                description,
                confidence,
                regex,
                unless,
            }),
            Err(e) => {
                warn!(domain = self.domain, rule = issue_type, error = %e, "Invalid rule pattern, skipping");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule over every code line; at most one issue per (type, line)
    pub fn scan(&self, file: &Path, source: &str) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (index, line) in code_lines(source) {
            let mut seen: Vec<&str> = Vec::new();
            for rule in &self.rules {
                if seen.contains(&rule.issue_type) || !rule.is_match(line) {
                    continue;
                }
                seen.push(rule.issue_type);
                issues.push(self.issue(file, index + 1, rule));
            }
        }
        issues
    }

    pub fn issue(&self, file: &Path, line: usize, rule: &PatternRule) -> Issue {
        issue_at(self.domain, rule.issue_type, rule.severity, rule.description, file, line)
            .with_confidence(rule.confidence)
    }
}

/// Builds an issue with an id stable across runs of the same file
pub fn issue_at(
    domain: &str,
    issue_type: &str,
    severity: Severity,
    description: &str,
    file: &Path,
    line: usize,
) -> Issue {
    Issue::new(domain, issue_type, severity, description)
        .with_id(format!(
            "{}:{}:{}:{}",
            domain,
            issue_type,
            file.display(),
            line
        ))
        .at(file, line)
}

/// Non-blank lines that are not pure comments, with zero-based indexes
pub fn code_lines(source: &str) -> impl Iterator<Item = (usize, &str)> {
    source.lines().enumerate().filter(|(_, line)| {
        let trimmed = line.trim_start();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

pub fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let rules = RuleSet::new("security")
            .rule("ok", Severity::Low, r"\beval\(", "eval")
            .rule("broken", Severity::Low, r"(unclosed", "broken");
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_scan_ignores_comments_and_reports_lines() {
        let rules = RuleSet::new("security").rule("eval_usage", Severity::High, r"\beval\(", "eval");
        let source = "x = 1\n# eval(x)\ny = eval(x)\n";
        let issues = rules.scan(Path::new("a.py"), source);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line(), Some(3));
        assert_eq!(issues[0].id, "security:eval_usage:a.py:3");
        assert_eq!(issues[0].confidence, 0.9);
    }

    #[test]
    fn test_unless_suppresses_match() {
        let rules = RuleSet::new("integration").rule_unless(
            "missing_timeout",
            Severity::Medium,
            r"requests\.get\(",
            "timeout",
            "no timeout",
        );
        let source = "requests.get(url)\nrequests.get(url, timeout=5)\n";
        let issues = rules.scan(Path::new("a.py"), source);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line(), Some(1));
    }

    #[test]
    fn test_same_type_reported_once_per_line() {
        let rules = RuleSet::new("security")
            .rule("sql_injection", Severity::High, r"execute\(f", "a")
            .rule("sql_injection", Severity::High, r"SELECT", "b");
        let issues = rules.scan(Path::new("a.py"), "c.execute(f\"SELECT {x}\")\n");
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_indentation_counts_tabs_as_four() {
        assert_eq!(indentation("    for x in y:"), 4);
        assert_eq!(indentation("\tfor x in y:"), 4);
        assert_eq!(indentation("pass"), 0);
    }
}
