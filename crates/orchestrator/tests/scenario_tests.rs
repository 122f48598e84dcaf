//! End-to-end scenarios with the built-in analyzers

use async_trait::async_trait;
use common::SniffConfig;
use orchestrator::{ResourceProbe, SniffOrchestrator};
use sniff_core::{
    AnalysisStatus, Classification, FixSuggestion, Issue, OracleError, ScoringOracle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const VULNERABLE: &str = "import sqlite3\n\ndef load(cur, user_id):\n    cur.execute(f\"SELECT * FROM users WHERE id = {user_id}\")\n    return cur.fetchall()\n";

struct StubOracle {
    confidence: f64,
}

#[async_trait]
impl ScoringOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    async fn score(&self, _text: &str) -> Result<Classification, OracleError> {
        Ok(Classification {
            label: "sql_injection".into(),
            confidence: self.confidence,
        })
    }

    async fn suggest(&self, issue: &Issue) -> Result<FixSuggestion, OracleError> {
        Ok(FixSuggestion {
            issue_id: issue.id.clone(),
            confidence: self.confidence,
            suggested_change: "use a parameterized query".into(),
            description: issue.description.clone(),
        })
    }
}

struct StubProbe {
    cpu: f64,
}

impl ResourceProbe for StubProbe {
    fn cpu_percent(&self) -> f64 {
        self.cpu
    }

    fn memory_percent(&self) -> f64 {
        20.0
    }

    fn disk_percent(&self) -> f64 {
        30.0
    }
}

async fn orchestrator(dir: &TempDir, config: SniffConfig) -> SniffOrchestrator {
    let registry = analyzers::builtin_registry().unwrap();
    SniffOrchestrator::builder(config.rooted_at(dir.path()), registry)
        .oracle(Arc::new(StubOracle { confidence: 0.9 }))
        .probe(Arc::new(StubProbe { cpu: 95.0 }))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_sql_injection_is_found_suggested_and_fixed() {
    let dir = TempDir::new().unwrap();
    let config = SniffConfig {
        confidence_threshold: 0.8,
        ..SniffConfig::default()
    };
    let orchestrator = orchestrator(&dir, config).await;
    orchestrator.start().await;
    let file = dir.path().join("users.py");
    std::fs::write(&file, VULNERABLE).unwrap();
    let security = vec!["security".to_string()];

    let before = orchestrator.run_file_sniffing(&file, &security).await;
    let injections: Vec<Issue> = before
        .issues()
        .filter(|i| i.issue_type == "sql_injection")
        .cloned()
        .collect();
    assert!(!injections.is_empty());

    let report = orchestrator.fix_issues(injections.clone()).await;
    assert_eq!(report.suggestions.len(), injections.len());
    assert!(report.suggestions.iter().all(|s| s.confidence >= 0.8));
    assert_eq!(report.fixed.len(), injections.len());
    assert!(report.failed.is_empty());

    let after = orchestrator.run_file_sniffing(&file, &security).await;
    assert!(after.issue_count < before.issue_count);
    let rewritten = std::fs::read_to_string(&file).unwrap();
    assert!(rewritten.contains("WHERE id = ?\", (user_id,)"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_fix_waits_for_file_lock_under_any_spelling_of_the_path() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, SniffConfig::default()).await;
    orchestrator.start().await;
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let file = dir.path().join("users.py");
    std::fs::write(&file, VULNERABLE).unwrap();
    let canonical = std::fs::canonicalize(&file).unwrap();
    let alias = dir.path().join("sub").join("..").join("users.py");

    let before = orchestrator
        .run_file_sniffing(&file, &["security".to_string()])
        .await;
    let issues: Vec<Issue> = before
        .issues()
        .filter(|i| i.issue_type == "sql_injection")
        .map(|i| i.clone().at(&alias, i.line().unwrap()))
        .collect();
    assert_eq!(issues.len(), 1);

    let lease = orchestrator.sniffing().lock_file(&canonical).await;
    let fixing = orchestrator.fix_issues(issues);
    tokio::pin!(fixing);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), &mut fixing)
            .await
            .is_err()
    );
    assert_eq!(std::fs::read_to_string(&file).unwrap(), VULNERABLE);

    drop(lease);
    let report = fixing.await;
    assert_eq!(report.fixed.len(), 1);
    assert!(std::fs::read_to_string(&file).unwrap().contains("(user_id,)"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_auto_fix_verifies_touched_files() {
    let dir = TempDir::new().unwrap();
    let config = SniffConfig {
        auto_fix_enabled: true,
        ..SniffConfig::default()
    };
    let orchestrator = orchestrator(&dir, config).await;
    orchestrator.start().await;
    let file = dir.path().join("users.py");
    std::fs::write(&file, VULNERABLE).unwrap();

    let before = orchestrator
        .run_file_sniffing(&file, &["security".to_string()])
        .await;
    let issues: Vec<Issue> = before.issues().cloned().collect();
    let report = orchestrator.fix_issues(issues).await;

    assert_eq!(report.verifications.len(), 1);
    let verification = &report.verifications[0];
    assert!(verification.improved);
    assert!(verification.issues_after < verification.issues_before);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_unknown_domain_batch_returns_error_status() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, SniffConfig::default()).await;
    orchestrator.start().await;

    let report = orchestrator
        .run_domain_sniffing("bogus_domain", &[PathBuf::from("x.py")])
        .await;
    assert_eq!(report.status, AnalysisStatus::Error);
    assert!(report.error.as_deref().unwrap().contains("bogus_domain"));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "error");
    assert!(orchestrator.audit_entries().await.is_empty());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_domain_batch_reports_every_file() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, SniffConfig::default()).await;
    orchestrator.start().await;
    let good = dir.path().join("users.py");
    std::fs::write(&good, VULNERABLE).unwrap();
    let missing = dir.path().join("gone.py");

    let report = orchestrator
        .run_domain_sniffing("security", &[good, missing])
        .await;
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].status, AnalysisStatus::Failure);
    assert_eq!(report.results[1].status, AnalysisStatus::Error);
    assert_eq!(report.status, AnalysisStatus::Error);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_cpu_breach_persists_one_high_alert() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, SniffConfig::default()).await;
    let alerts_dir = orchestrator.config().alerts_path.clone();

    let health = orchestrator.monitoring().run_health_check_once().await;
    assert_eq!(health.alerts_raised, 1);

    let alerts: Vec<PathBuf> = std::fs::read_dir(&alerts_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(alerts.len(), 1);
    let alert: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&alerts[0]).unwrap()).unwrap();
    assert_eq!(alert["severity"], "high");
    assert_eq!(alert["source"], "cpu");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_hook_fails_on_blocking_issues() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, SniffConfig::default()).await;
    orchestrator.start().await;
    let vulnerable = dir.path().join("users.py");
    std::fs::write(&vulnerable, VULNERABLE).unwrap();

    let outcome = orchestrator.run_hook(&[vulnerable.clone()]).await;
    assert!(!outcome.passed);
    assert_eq!(outcome.failing, vec![vulnerable]);

    let empty = orchestrator.run_hook(&[]).await;
    assert!(empty.passed);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_classify_goes_through_confidence_gate() {
    let dir = TempDir::new().unwrap();
    let lenient = orchestrator(&dir, SniffConfig::default()).await;
    let label = lenient
        .classify("cur.execute(f\"SELECT {x}\")")
        .await
        .map(|c| c.label);
    assert_eq!(label.as_deref(), Some("sql_injection"));
    lenient.shutdown().await;

    let strict_dir = TempDir::new().unwrap();
    let strict = orchestrator(
        &strict_dir,
        SniffConfig {
            confidence_threshold: 0.95,
            ..SniffConfig::default()
        },
    )
    .await;
    assert!(strict.classify("anything").await.is_none());
    strict.shutdown().await;
}
