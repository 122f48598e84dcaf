//! Performance domain: loop structure and blocking calls

use crate::rules::{code_lines, indentation, issue_at, RuleSet};
use crate::source::read_source;
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Severity};
use std::path::Path;

pub struct PerformanceAnalyzer {
    rules: RuleSet,
    /// Loops nested deeper than this are reported
    max_loop_depth: usize,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceAnalyzer {
    pub fn new() -> Self {
        let rules = RuleSet::new(domains::PERFORMANCE)
            .rule(
                "range_len_iteration",
                Severity::Low,
                r"\bfor\s+\w+\s+in\s+range\(\s*len\(",
                "Index loop over range(len(...)); iterate directly or use enumerate",
            )
            .rule(
                "blocking_sleep",
                Severity::Low,
                r"\btime\.sleep\s*\(",
                "Blocking sleep call",
            )
            .rule(
                "full_file_read",
                Severity::Low,
                r"\.readlines\(\s*\)",
                "Whole file loaded into memory with readlines()",
            );
        Self {
            rules,
            max_loop_depth: 2,
        }
    }

    pub fn with_max_loop_depth(mut self, depth: usize) -> Self {
        self.max_loop_depth = depth.max(1);
        self
    }
}

fn is_loop_header(trimmed: &str) -> bool {
    trimmed.starts_with("for ") || trimmed.starts_with("while ") || trimmed.starts_with("async for ")
}

fn is_string_concat(trimmed: &str) -> bool {
    let Some((_, rhs)) = trimmed.split_once("+=") else {
        return false;
    };
    let rhs = rhs.trim_start();
    ["\"", "'", "f\"", "f'", "str("]
        .iter()
        .any(|prefix| rhs.starts_with(prefix))
}

impl Analyzer for PerformanceAnalyzer {
    fn domain(&self) -> &str {
        domains::PERFORMANCE
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        let mut issues = self.rules.scan(file, &source);

        let mut open_loops: Vec<usize> = Vec::new();
        let mut max_depth = 0;
        let mut loop_count = 0;

        for (index, line) in code_lines(&source) {
            let indent = indentation(line);
            while open_loops.last().is_some_and(|&open| indent <= open) {
                open_loops.pop();
            }

            let trimmed = line.trim_start();
            if !open_loops.is_empty() && is_string_concat(trimmed) {
                issues.push(issue_at(
                    domains::PERFORMANCE,
                    "string_concat_in_loop",
                    Severity::Low,
                    "String built with += inside a loop; collect parts and join",
                    file,
                    index + 1,
                ));
            }

            if is_loop_header(trimmed) {
                open_loops.push(indent);
                loop_count += 1;
                max_depth = max_depth.max(open_loops.len());
                if open_loops.len() > self.max_loop_depth {
                    issues.push(
                        issue_at(
                            domains::PERFORMANCE,
                            "nested_loop",
                            Severity::Medium,
                            "Deeply nested loop",
                            file,
                            index + 1,
                        )
                        .with_confidence(0.7),
                    );
                }
            }
        }

        let mut payload = AnalysisPayload::new()
            .metric("loop_count", loop_count as f64)
            .metric("max_loop_depth", max_depth as f64);
        if max_depth > self.max_loop_depth {
            payload = payload.recommend("Flatten nested loops with lookups keyed by dict or set");
        }
        payload.issues = issues;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_core::AnalysisStatus;
    use std::fs;

    const SOURCE: &str = "\
def report(rows, cols, cells):
    out = ''
    for r in rows:
        for c in cols:
            for cell in cells:
                out += str(cell)
    for i in range(len(rows)):
        print(rows[i])
    return out
";

    #[test]
    fn test_reports_nesting_and_concat() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.py");
        fs::write(&file, SOURCE).unwrap();

        let payload = PerformanceAnalyzer::new().analyze(&file).unwrap();
        let kinds: Vec<&str> = payload.issues.iter().map(|i| i.issue_type.as_str()).collect();
        assert!(kinds.contains(&"nested_loop"));
        assert!(kinds.contains(&"string_concat_in_loop"));
        assert!(kinds.contains(&"range_len_iteration"));
        assert_eq!(payload.metrics["max_loop_depth"], 3.0);
        assert_eq!(payload.metrics["loop_count"], 4.0);
    }

    #[test]
    fn test_loop_depth_resets_after_dedent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flat.py");
        fs::write(&file, "for a in x:\n    pass\nfor b in y:\n    for c in z:\n        pass\n").unwrap();

        let result = PerformanceAnalyzer::new().sniff(&file);
        assert_eq!(result.status, AnalysisStatus::Success);
        assert!(result.issues.is_empty());
        assert_eq!(result.metrics["max_loop_depth"], 2.0);
    }
}
