//! Functional domain: constructs that are almost always bugs

use crate::rules::{code_lines, compile, issue_at, RuleSet};
use crate::source::{read_source, EditableSource};
use regex::Regex;
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Issue, Severity};
use std::path::Path;

pub const NONE_COMPARISON: &str = "none_comparison";

pub struct FunctionalAnalyzer {
    rules: RuleSet,
    not_equal_none: Option<Regex>,
    equal_none: Option<Regex>,
}

impl Default for FunctionalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionalAnalyzer {
    pub fn new() -> Self {
        let rules = RuleSet::new(domains::FUNCTIONAL)
            .rule(
                "bare_except",
                Severity::Medium,
                r"^\s*except\s*:",
                "Bare except catches SystemExit and KeyboardInterrupt",
            )
            .rule(
                "mutable_default_argument",
                Severity::Medium,
                r"\bdef\s+\w+\s*\(.*=\s*(\[\s*\]|\{\s*\}|list\(\)|dict\(\)|set\(\))",
                "Mutable default argument is shared between calls",
            )
            .rule(
                NONE_COMPARISON,
                Severity::Low,
                r"[=!]=\s*None\b",
                "Comparison to None with == or !=",
            )
            .rule(
                "assert_on_tuple",
                Severity::High,
                r"\bassert\s*\(.+,.+\)\s*$",
                "Assert on a non-empty tuple is always true",
            )
            .rule(
                "literal_identity_comparison",
                Severity::Medium,
                r#"\bis\s+(not\s+)?(-?\d+\b|["'])"#,
                "Identity comparison against a literal",
            );
        Self {
            rules,
            not_equal_none: compile(r"\s*!=\s*None\b"),
            equal_none: compile(r"\s*==\s*None\b"),
        }
    }

    fn rewrite_none_comparison(&self, line: &str) -> Option<String> {
        let (not_equal, equal) = (self.not_equal_none.as_ref()?, self.equal_none.as_ref()?);
        let line = not_equal.replace_all(line, " is not None");
        Some(equal.replace_all(&line, " is None").into_owned())
    }
}

impl Analyzer for FunctionalAnalyzer {
    fn domain(&self) -> &str {
        domains::FUNCTIONAL
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        let mut issues = self.rules.scan(file, &source);

        // `except ...: pass` silently swallows failures
        let lines: Vec<(usize, &str)> = code_lines(&source).collect();
        for pair in lines.windows(2) {
            let (index, header) = pair[0];
            let (_, body) = pair[1];
            let header = header.trim();
            if header.starts_with("except") && header.ends_with(':') && body.trim() == "pass" {
                issues.push(issue_at(
                    domains::FUNCTIONAL,
                    "swallowed_exception",
                    Severity::Medium,
                    "Exception handler discards the error",
                    file,
                    index + 1,
                ));
            }
        }

        let function_count = lines
            .iter()
            .filter(|(_, l)| l.trim_start().starts_with("def "))
            .count();
        let mut payload = AnalysisPayload::new().metric("function_count", function_count as f64);
        if issues.iter().any(|i| i.issue_type == NONE_COMPARISON) {
            payload = payload.recommend("Compare with None using `is` / `is not`");
        }
        payload.issues = issues;
        Ok(payload)
    }

    fn fix_issues(&self, file: &Path, issues: &mut [Issue]) -> Result<bool, AnalyzerError> {
        let mut source = EditableSource::load(file)?;
        for issue in issues
            .iter_mut()
            .filter(|i| i.domain == domains::FUNCTIONAL && i.issue_type == NONE_COMPARISON)
        {
            let Some(line) = issue.line() else { continue };
            if source.edit_line(line, |l| self.rewrite_none_comparison(l)) {
                issue.fixed = true;
            }
        }
        if source.is_changed() {
            source.save(file)?;
        }
        Ok(source.is_changed())
    }
}
