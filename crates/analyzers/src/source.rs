//! Reading and rewriting analyzed files

use sniff_core::AnalyzerError;
use std::fs;
use std::path::Path;

pub fn read_source(file: &Path) -> Result<String, AnalyzerError> {
    if file.is_dir() {
        return Err(AnalyzerError::Unsupported(file.to_path_buf()));
    }
    fs::read_to_string(file).map_err(|e| AnalyzerError::io(file, e))
}

/// Replaces the file content through a sibling temp file and a rename
pub fn write_source(file: &Path, content: &str) -> Result<(), AnalyzerError> {
    let tmp = file.with_extension("sniff-fix.tmp");
    fs::write(&tmp, content).map_err(|e| AnalyzerError::io(&tmp, e))?;
    fs::rename(&tmp, file).map_err(|e| AnalyzerError::io(file, e))
}

/// Source split into lines that can be edited in place and joined back
pub struct EditableSource {
    lines: Vec<String>,
    trailing_newline: bool,
    changed: bool,
}

impl EditableSource {
    pub fn parse(source: &str) -> Self {
        Self {
            lines: source.lines().map(str::to_string).collect(),
            trailing_newline: source.ends_with('\n'),
            changed: false,
        }
    }

    pub fn load(file: &Path) -> Result<Self, AnalyzerError> {
        read_source(file).map(|source| Self::parse(&source))
    }

    /// One-based line access
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    /// Applies `edit` to a one-based line; returns whether the line changed
    pub fn edit_line(&mut self, number: usize, edit: impl FnOnce(&str) -> Option<String>) -> bool {
        let Some(index) = number.checked_sub(1) else {
            return false;
        };
        let Some(current) = self.lines.get(index) else {
            return false;
        };
        match edit(current) {
            Some(replacement) if replacement != *current => {
                self.lines[index] = replacement;
                self.changed = true;
                true
            }
            _ => false,
        }
    }

    /// Makes `module` importable without changing the line count, so issue
    /// locations from other analyzers stay valid. Extends the first top-level
    /// `import` line, or prefixes `fallback_line` when there is none.
    pub fn ensure_import(&mut self, module: &str, fallback_line: usize) {
        let imported = self.lines.iter().any(|l| {
            split_comment(l)
                .0
                .trim()
                .strip_prefix("import ")
                .is_some_and(|names| names.split(',').any(|n| n.trim() == module))
        });
        if imported {
            return;
        }

        let statement = self
            .lines
            .iter()
            .position(|l| l.starts_with("import ") && !l.contains(" as ") && !l.contains(';'));
        match statement {
            Some(index) => {
                let (code, comment) = split_comment(&self.lines[index]);
                let mut line = format!("{}, {}", code.trim_end(), module);
                if !comment.is_empty() {
                    line.push_str("  ");
                    line.push_str(comment);
                }
                self.lines[index] = line;
                self.changed = true;
            }
            None => {
                self.edit_line(fallback_line, |l| {
                    let body = l.trim_start();
                    let indent = &l[..l.len() - body.len()];
                    Some(format!("{}import {}; {}", indent, module, body))
                });
            }
        }
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn save(&self, file: &Path) -> Result<(), AnalyzerError> {
        write_source(file, &self.render())
    }
}

/// Splits `code  # comment` at the first `#`; meant for import lines, which
/// carry no string literals
fn split_comment(line: &str) -> (&str, &str) {
    match line.find('#') {
        Some(at) => (&line[..at], &line[at..]),
        None => (line, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_line_tracks_changes() {
        let mut source = EditableSource::parse("a = 1\nb = 2\n");
        assert!(!source.edit_line(1, |l| Some(l.to_string())));
        assert!(source.edit_line(2, |l| Some(l.replace('2', "3"))));
        assert!(!source.edit_line(9, |_| Some(String::new())));
        assert!(source.is_changed());
        assert_eq!(source.render(), "a = 1\nb = 3\n");
    }

    #[test]
    fn test_ensure_import_keeps_line_count() {
        let mut source = EditableSource::parse("\"\"\"doc\"\"\"\nimport sys\nx = 1");
        source.ensure_import("os", 3);
        source.ensure_import("os", 3);
        assert_eq!(source.render(), "\"\"\"doc\"\"\"\nimport sys, os\nx = 1");

        let mut source = EditableSource::parse("from a import b\n    key = 1\n");
        source.ensure_import("os", 2);
        assert_eq!(source.render(), "from a import b\n    import os; key = 1\n");
    }

    #[test]
    fn test_ensure_import_skips_trailing_comment() {
        let mut source = EditableSource::parse("import json  # stdlib
x = 1
");
        source.ensure_import("os", 2);
        assert_eq!(source.render(), "import json, os  # stdlib
x = 1
");

        let mut source = EditableSource::parse("import os  # env
x = 1
");
        source.ensure_import("os", 2);
        assert!(!source.is_changed());
    }

    #[test]
    fn test_read_source_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_source(dir.path()),
            Err(AnalyzerError::Unsupported(_))
        ));
    }
}
