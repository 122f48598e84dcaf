//! Unit domain: test presence for modules, assertion presence for tests

use crate::rules::{code_lines, indentation, issue_at};
use crate::source::read_source;
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Severity};
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct UnitAnalyzer;

impl UnitAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn is_test_file(file: &Path) -> bool {
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let in_tests_dir = file
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|name| name == "tests");
        stem.starts_with("test_") || stem.ends_with("_test") || in_tests_dir
    }

    /// Places a test module for `file` is conventionally found
    pub fn candidate_test_files(file: &Path) -> Vec<PathBuf> {
        let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
            return Vec::new();
        };
        let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("py");
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let prefixed = format!("test_{}.{}", stem, ext);
        let suffixed = format!("{}_test.{}", stem, ext);

        let mut candidates = vec![
            dir.join(&prefixed),
            dir.join(&suffixed),
            dir.join("tests").join(&prefixed),
        ];
        if let Some(parent) = dir.parent() {
            candidates.push(parent.join("tests").join(&prefixed));
        }
        candidates
    }

    fn analyze_test_module(&self, file: &Path, source: &str) -> AnalysisPayload {
        let mut issues = Vec::new();
        let mut test_count = 0;
        let mut assertion_count = 0;
        // (line, indent, has_assertion) of the test function being read
        let mut current: Option<(usize, usize, bool)> = None;

        let close = |current: &mut Option<(usize, usize, bool)>, issues: &mut Vec<_>| {
            if let Some((line, _, false)) = current.take() {
                issues.push(issue_at(
                    domains::UNIT,
                    "test_without_assertion",
                    Severity::Low,
                    "Test function makes no assertion",
                    file,
                    line,
                ));
            }
        };

        for (index, line) in code_lines(source) {
            let indent = indentation(line);
            let trimmed = line.trim_start();

            if current.is_some_and(|(_, open, _)| indent <= open) {
                close(&mut current, &mut issues);
            }

            if trimmed.starts_with("def test_") || trimmed.starts_with("async def test_") {
                test_count += 1;
                current = Some((index + 1, indent, false));
                continue;
            }

            let asserts = trimmed.starts_with("assert ")
                || trimmed.contains(".assert")
                || trimmed.contains("pytest.raises");
            if asserts {
                assertion_count += 1;
                if let Some((_, _, seen)) = current.as_mut() {
                    *seen = true;
                }
            }
        }
        close(&mut current, &mut issues);

        if test_count == 0 {
            issues.push(issue_at(
                domains::UNIT,
                "empty_test_module",
                Severity::Medium,
                "Test module defines no test functions",
                file,
                1,
            ));
        }

        let mut payload = AnalysisPayload::new()
            .metric("test_count", test_count as f64)
            .metric("assertion_count", assertion_count as f64);
        payload.issues = issues;
        payload
    }

    fn analyze_module(&self, file: &Path, source: &str) -> AnalysisPayload {
        let public_functions = code_lines(source)
            .filter(|(_, l)| {
                let t = l.trim_start();
                (t.starts_with("def ") && !t.starts_with("def _"))
                    || (t.starts_with("async def ") && !t.starts_with("async def _"))
            })
            .count();
        let found: Vec<PathBuf> = Self::candidate_test_files(file)
            .into_iter()
            .filter(|p| p.is_file())
            .collect();

        let mut payload = AnalysisPayload::new()
            .metric("public_functions", public_functions as f64)
            .metric("test_files_found", found.len() as f64);
        if public_functions > 0 && found.is_empty() {
            payload = payload
                .issue(issue_at(
                    domains::UNIT,
                    "missing_tests",
                    Severity::Medium,
                    "No test module found for this file",
                    file,
                    1,
                ))
                .recommend(format!(
                    "Add tests in {}",
                    Self::candidate_test_files(file)
                        .first()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ));
        }
        payload
    }
}

impl Analyzer for UnitAnalyzer {
    fn domain(&self) -> &str {
        domains::UNIT
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        if Self::is_test_file(file) {
            Ok(self.analyze_test_module(file, &source))
        } else {
            Ok(self.analyze_module(file, &source))
        }
    }
}
