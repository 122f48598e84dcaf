//! Documentation domain: docstring coverage

use crate::rules::{code_lines, issue_at};
use crate::source::read_source;
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Severity};
use std::path::Path;

const DOCSTRING_PREFIXES: [&str; 4] = ["\"\"\"", "'''", "r\"\"\"", "r'''"];

fn is_docstring(line: &str) -> bool {
    let t = line.trim_start();
    DOCSTRING_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Name of a public `def`/`class` declared on this line
fn public_definition(trimmed: &str) -> Option<&str> {
    let rest = trimmed
        .strip_prefix("async def ")
        .or_else(|| trimmed.strip_prefix("def "))
        .or_else(|| trimmed.strip_prefix("class "))?;
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty() && !name.starts_with('_')).then_some(name)
}

pub struct DocumentationAnalyzer {
    /// Coverage (percent) below which a recommendation is added
    min_coverage: f64,
}

impl Default for DocumentationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentationAnalyzer {
    pub fn new() -> Self {
        Self { min_coverage: 80.0 }
    }
}

impl Analyzer for DocumentationAnalyzer {
    fn domain(&self) -> &str {
        domains::DOCUMENTATION
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        let lines: Vec<(usize, &str)> = code_lines(&source).collect();
        let mut payload = AnalysisPayload::new();

        if let Some((_, first)) = lines.first() {
            if !is_docstring(first) {
                payload = payload.issue(issue_at(
                    domains::DOCUMENTATION,
                    "missing_module_docstring",
                    Severity::Low,
                    "Module has no docstring",
                    file,
                    1,
                ));
            }
        }

        let mut definitions = 0usize;
        let mut documented = 0usize;
        for (pos, (index, line)) in lines.iter().enumerate() {
            let Some(name) = public_definition(line.trim_start()) else {
                continue;
            };
            definitions += 1;

            // Skip continuation lines of a multi-line signature
            let body = lines[pos..]
                .iter()
                .position(|(_, l)| l.trim_end().ends_with(':'))
                .and_then(|header_end| lines.get(pos + header_end + 1));
            if body.is_some_and(|(_, l)| is_docstring(l)) {
                documented += 1;
            } else {
                payload = payload.issue(issue_at(
                    domains::DOCUMENTATION,
                    "missing_docstring",
                    Severity::Low,
                    &format!("Public definition '{}' has no docstring", name),
                    file,
                    index + 1,
                ));
            }
        }

        let coverage = if definitions == 0 {
            100.0
        } else {
            documented as f64 * 100.0 / definitions as f64
        };
        payload = payload
            .metric("definitions", definitions as f64)
            .metric("documented", documented as f64)
            .metric("doc_coverage", coverage);
        if coverage < self.min_coverage {
            payload = payload.recommend(format!(
                "Docstring coverage is {:.0}%; document public functions and classes",
                coverage
            ));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_public_definition() {
        assert_eq!(public_definition("def run(x):"), Some("run"));
        assert_eq!(public_definition("async def fetch():"), Some("fetch"));
        assert_eq!(public_definition("class Store(Base):"), Some("Store"));
        assert_eq!(public_definition("def _private():"), None);
        assert_eq!(public_definition("return x"), None);
    }

    #[test]
    fn test_coverage_and_multiline_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("store.py");
        fs::write(
            &file,
            "\"\"\"Storage helpers.\"\"\"\n\nclass Store:\n    \"\"\"Keeps rows.\"\"\"\n\n    def put(\n        self, row,\n    ):\n        \"\"\"Add a row.\"\"\"\n\n    def get(self, key):\n        return key\n",
        )
        .unwrap();

        let payload = DocumentationAnalyzer::new().analyze(&file).unwrap();
        assert_eq!(payload.metrics["definitions"], 3.0);
        assert_eq!(payload.metrics["documented"], 2.0);
        assert_eq!(payload.issues.len(), 1);
        assert_eq!(payload.issues[0].line(), Some(11));
        assert!(payload.issues[0].description.contains("'get'"));
        assert_eq!(payload.recommendations.len(), 1);
    }

    #[test]
    fn test_missing_module_docstring() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bare.py");
        fs::write(&file, "# comment\nX = 1\n").unwrap();

        let payload = DocumentationAnalyzer::new().analyze(&file).unwrap();
        assert_eq!(payload.issues.len(), 1);
        assert_eq!(payload.issues[0].issue_type, "missing_module_docstring");
        assert_eq!(payload.metrics["doc_coverage"], 100.0);
    }
}
