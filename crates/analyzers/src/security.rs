//! Security domain: injection, secrets, dynamic execution

use crate::rules::{code_lines, RuleSet};
use crate::source::{read_source, EditableSource};
use sniff_core::{domains, AnalysisPayload, Analyzer, AnalyzerError, Issue, Severity};
use std::path::Path;
use tracing::debug;

pub const SQL_INJECTION: &str = "sql_injection";
pub const HARDCODED_SECRET: &str = "hardcoded_secret";

pub struct SecurityAnalyzer {
    rules: RuleSet,
}

impl Default for SecurityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityAnalyzer {
    pub fn new() -> Self {
        let rules = RuleSet::new(domains::SECURITY)
            .rule(
                SQL_INJECTION,
                Severity::High,
                r#"(?i)\.(execute|executemany)\(\s*f["']"#,
                "SQL query built with an f-string",
            )
            .rule(
                SQL_INJECTION,
                Severity::High,
                r#"(?i)\.(execute|executemany)\(\s*["'][^"']*["']\s*(%|\+|\.format\()"#,
                "SQL query built by string formatting",
            )
            .rule_with_confidence(
                SQL_INJECTION,
                Severity::High,
                r#"(?i)["']\s*(SELECT|INSERT|UPDATE|DELETE)\b[^"']*["']\s*\+\s*\w"#,
                "SQL query built by string concatenation",
                0.75,
            )
            .rule(
                HARDCODED_SECRET,
                Severity::High,
                r#"(?i)^\s*[a-z0-9_]*?(password|passwd|secret|api_key|apikey|token)[a-z0-9_]*\s*=\s*("[^"]{4,}"|'[^']{4,}')\s*$"#,
                "Credential assigned from a string literal",
            )
            .rule(
                "eval_usage",
                Severity::High,
                r"(^|[^\w.])(eval|exec)\s*\(",
                "Dynamic code execution with eval/exec",
            )
            .rule(
                "shell_injection",
                Severity::High,
                r"\bos\.(system|popen)\s*\(|\bsubprocess\.\w+\(.*shell\s*=\s*True",
                "Command executed through a shell",
            )
            .rule(
                "insecure_deserialization",
                Severity::Medium,
                r"\b(pickle|marshal)\.loads?\s*\(",
                "Deserialization of untrusted data",
            )
            .rule(
                "weak_hash",
                Severity::Medium,
                r"\bhashlib\.(md5|sha1)\s*\(",
                "Weak hash algorithm",
            )
            .rule(
                "tls_verification_disabled",
                Severity::High,
                r"\bverify\s*=\s*False\b",
                "TLS certificate verification disabled",
            );
        Self { rules }
    }
}

impl Analyzer for SecurityAnalyzer {
    fn domain(&self) -> &str {
        domains::SECURITY
    }

    fn analyze(&self, file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
        let source = read_source(file)?;
        let issues = self.rules.scan(file, &source);

        let count = |kind: &str| issues.iter().filter(|i| i.issue_type == kind).count();
        let mut payload = AnalysisPayload::new()
            .metric("lines_scanned", code_lines(&source).count() as f64)
            .metric("sql_injection_count", count(SQL_INJECTION) as f64)
            .metric("hardcoded_secret_count", count(HARDCODED_SECRET) as f64);

        if count(SQL_INJECTION) > 0 {
            payload = payload.recommend("Pass query parameters separately instead of formatting them into SQL");
        }
        if count(HARDCODED_SECRET) > 0 {
            payload = payload.recommend("Load credentials from the environment or a secret store");
        }
        payload.issues = issues;
        Ok(payload)
    }

    fn fix_issues(&self, file: &Path, issues: &mut [Issue]) -> Result<bool, AnalyzerError> {
        let mut source = EditableSource::load(file)?;
        let style = ParamStyle::detect(&source.render());
        let mut first_secret: Option<usize> = None;

        for issue in issues.iter_mut().filter(|i| i.domain == domains::SECURITY) {
            let Some(line) = issue.line() else { continue };
            let fixed = match issue.issue_type.as_str() {
                SQL_INJECTION => source.edit_line(line, |l| parameterize_query(l, style)),
                HARDCODED_SECRET => {
                    let moved = source.edit_line(line, externalize_secret);
                    if moved && first_secret.is_none() {
                        first_secret = Some(line);
                    }
                    moved
                }
                _ => false,
            };
            if fixed {
                debug!(file = %file.display(), line, kind = %issue.issue_type, "Applied security fix");
                issue.fixed = true;
            }
        }

        if let Some(line) = first_secret {
            source.ensure_import("os", line);
        }
        if source.is_changed() {
            source.save(file)?;
        }
        Ok(source.is_changed())
    }
}

/// Placeholder syntax of the DB-API driver a module talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?`, used by sqlite3
    Qmark,
    /// `%s`, used by psycopg, pymysql, MySQLdb and most other drivers
    Format,
}

impl ParamStyle {
    /// `Qmark` only when sqlite3 is the sole driver imported
    pub fn detect(source: &str) -> Self {
        let mut sqlite = false;
        let mut other = false;
        for (_, line) in code_lines(source) {
            let line = line.trim_start();
            if !(line.starts_with("import ") || line.starts_with("from ")) {
                continue;
            }
            sqlite |= line.contains("sqlite3");
            other |= ["psycopg", "pymysql", "MySQLdb", "mysql.connector", "pgdb"]
                .iter()
                .any(|driver| line.contains(driver));
        }
        if sqlite && !other {
            Self::Qmark
        } else {
            Self::Format
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            Self::Qmark => "?",
            Self::Format => "%s",
        }
    }
}

/// `cur.execute(f"... {x} ...")` -> `cur.execute("... %s ...", (x,))`, or
/// `?` in place of `%s` for [`ParamStyle::Qmark`]
pub fn parameterize_query(line: &str, style: ParamStyle) -> Option<String> {
    let call = line.find(".execute(").or_else(|| line.find(".executemany("))?;
    let open = call + line[call..].find('(')? + 1;
    let rest = &line[open..];
    let literal = rest.trim_start();
    let literal_at = open + (rest.len() - literal.len());

    let mut chars = literal.chars();
    if !matches!(chars.next(), Some('f') | Some('F')) {
        return None;
    }
    let quote = chars.next().filter(|q| *q == '"' || *q == '\'')?;
    let body_start = literal_at + 2;
    let body_len = line[body_start..].find(quote)?;
    let body = &line[body_start..body_start + body_len];
    let tail = line[body_start + body_len + 1..].trim_start();
    if !tail.starts_with(')') {
        return None;
    }

    let (query, params) = extract_placeholders(body, style)?;
    if params.is_empty() {
        return None;
    }
    let tuple = if params.len() == 1 {
        format!("({},)", params[0])
    } else {
        format!("({})", params.join(", "))
    };
    Some(format!(
        "{}{}{}{}, {}{}",
        &line[..literal_at],
        quote,
        query,
        quote,
        tuple,
        tail
    ))
}

fn extract_placeholders(body: &str, style: ParamStyle) -> Option<(String, Vec<String>)> {
    let marker = style.placeholder();
    let mut query = String::with_capacity(body.len());
    let mut params = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                query.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                query.push('}');
            }
            '{' => {
                let mut expr = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        ch => expr.push(ch),
                    }
                }
                let expr = expr
                    .split(['!', ':'])
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if expr.is_empty() {
                    return None;
                }
                params.push(expr);
                query.push_str(marker);
            }
            // only the format style gives `%` a meaning
            '%' if style == ParamStyle::Format => query.push_str("%%"),
            other => query.push(other),
        }
    }

    let query = query
        .replace(&format!("'{}'", marker), marker)
        .replace(&format!("\"{}\"", marker), marker);
    Some((query, params))
}

/// `api_key = "abcd"` -> `api_key = os.environ.get("API_KEY")`
pub fn externalize_secret(line: &str) -> Option<String> {
    let (lhs, rhs) = line.split_once('=')?;
    let name = lhs.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let value = rhs.trim();
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if !quoted {
        return None;
    }
    let indent = &lhs[..lhs.len() - lhs.trim_start().len()];
    Some(format!(
        "{}{} = os.environ.get(\"{}\")",
        indent,
        name,
        name.to_uppercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sniff_core::AnalysisStatus;
    use std::fs;

    #[rstest]
    #[case(
        r#"    cur.execute(f"SELECT * FROM users WHERE id = {user_id}")"#,
        r#"    cur.execute("SELECT * FROM users WHERE id = %s", (user_id,))"#
    )]
    #[case(
        r#"db.execute(f"SELECT * FROM t WHERE a = '{a}' AND b = {b.id}")"#,
        r#"db.execute("SELECT * FROM t WHERE a = %s AND b = %s", (a, b.id))"#
    )]
    #[case(
        r#"c.execute(f'SELECT * FROM t WHERE name LIKE "x%" AND id = {i:d}')"#,
        r#"c.execute('SELECT * FROM t WHERE name LIKE "x%%" AND id = %s', (i,))"#
    )]
    fn test_parameterize_query(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            parameterize_query(input, ParamStyle::Format).as_deref(),
            Some(expected)
        );
    }

    #[rstest]
    #[case(
        r#"    cur.execute(f"SELECT * FROM users WHERE id = {user_id}")"#,
        r#"    cur.execute("SELECT * FROM users WHERE id = ?", (user_id,))"#
    )]
    #[case(
        r#"c.execute(f"SELECT * FROM t WHERE name = '{n}' AND pct LIKE '5%'")"#,
        r#"c.execute("SELECT * FROM t WHERE name = ? AND pct LIKE '5%'", (n,))"#
    )]
    fn test_parameterize_query_qmark(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            parameterize_query(input, ParamStyle::Qmark).as_deref(),
            Some(expected)
        );
    }

    #[rstest]
    #[case("import sqlite3\n", ParamStyle::Qmark)]
    #[case("from sqlite3 import connect\n", ParamStyle::Qmark)]
    #[case("import psycopg2\n", ParamStyle::Format)]
    #[case("import sqlite3\nimport pymysql\n", ParamStyle::Format)]
    #[case("x = 1\n", ParamStyle::Format)]
    fn test_param_style_follows_imported_driver(#[case] source: &str, #[case] expected: ParamStyle) {
        assert_eq!(ParamStyle::detect(source), expected);
    }

    #[rstest]
    #[case(r#"cur.execute("SELECT 1")"#)]
    #[case(r#"cur.execute(f"SELECT 1")"#)]
    #[case(r#"cur.execute(f"SELECT {x}" + y)"#)]
    fn test_parameterize_query_leaves_other_shapes(#[case] input: &str) {
        assert_eq!(parameterize_query(input, ParamStyle::Format), None);
    }

    #[test]
    fn test_externalize_secret() {
        assert_eq!(
            externalize_secret(r#"    db_password = "hunter22""#).as_deref(),
            Some(r#"    db_password = os.environ.get("DB_PASSWORD")"#)
        );
        assert_eq!(externalize_secret("token = compute()"), None);
    }

    #[test]
    fn test_detects_and_fixes_sql_injection() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("db.py");
        fs::write(
            &file,
            "import sqlite3\n\ndef load(cur, user_id):\n    cur.execute(f\"SELECT * FROM users WHERE id = {user_id}\")\n    return cur.fetchall()\n",
        )
        .unwrap();

        let analyzer = SecurityAnalyzer::new();
        let before = analyzer.sniff(&file);
        assert_eq!(before.status, AnalysisStatus::Failure);
        assert_eq!(before.issues.len(), 1);
        assert_eq!(before.issues[0].issue_type, SQL_INJECTION);
        assert_eq!(before.issues[0].line(), Some(4));

        let mut issues = before.issues.clone();
        assert!(analyzer.fix_issues(&file, &mut issues).unwrap());
        assert!(issues[0].fixed);
        let rewritten = fs::read_to_string(&file).unwrap();
        assert!(rewritten.contains(r#"cur.execute("SELECT * FROM users WHERE id = ?", (user_id,))"#));

        let after = analyzer.sniff(&file);
        assert_eq!(after.status, AnalysisStatus::Success);
        assert!(after.issues.is_empty());
    }

    #[test]
    fn test_secret_fix_makes_os_importable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.py");
        fs::write(&file, "import json\nAPI_KEY = 'sk-live-1234'\n").unwrap();

        let analyzer = SecurityAnalyzer::new();
        let mut issues = analyzer.analyze(&file).unwrap().issues;
        assert_eq!(issues.len(), 1);
        assert!(analyzer.fix_issues(&file, &mut issues).unwrap());

        let fixed = fs::read_to_string(&file).unwrap();
        assert_eq!(
            fixed,
            "import json, os\nAPI_KEY = os.environ.get(\"API_KEY\")\n"
        );
        assert!(analyzer.analyze(&file).unwrap().issues.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error_result() {
        let result = SecurityAnalyzer::new().sniff(Path::new("/definitely/not/here.py"));
        assert_eq!(result.status, AnalysisStatus::Error);
        assert!(result.error.is_some());
    }
}
