//! `SniffOrchestrator`: the one addressable service in front of the engine

use crate::audit::AuditLog;
use crate::cache::ResultsCache;
use crate::degradation::DegradationTracker;
use crate::monitoring::{AlertDispatcher, MonitoringSystem, NotificationSender, ResourceProbe};
use crate::reports::ReportWriter;
use crate::scoring::{FixAdvisor, HttpScoringOracle};
use crate::sniffing_loop::{LoopSettings, SniffingLoop};
use common::SniffConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sniff_core::{
    AggregatedResult, AnalysisResult, AnalysisStatus, AnalyzerRegistry, AuditEntry,
    Classification, DomainSniffReport, FixReport, FixSuggestion, FixVerification, Issue,
    ScoringOracle, SniffError, SniffResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a pre-commit or pre-push run over the changed files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOutcome {
    pub passed: bool,
    pub results: Vec<AggregatedResult>,
    /// Files whose status was anything but success
    pub failing: Vec<PathBuf>,
}

pub struct OrchestratorBuilder {
    config: SniffConfig,
    registry: AnalyzerRegistry,
    oracle: Option<Arc<dyn ScoringOracle>>,
    probe: Option<Arc<dyn ResourceProbe>>,
    senders: Vec<Arc<dyn NotificationSender>>,
    loop_settings: Option<LoopSettings>,
}

impl OrchestratorBuilder {
    /// Overrides the HTTP oracle described by `config.oracle`
    pub fn oracle(mut self, oracle: Arc<dyn ScoringOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Extra alert channel on top of the configured ones
    pub fn sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn loop_settings(mut self, settings: LoopSettings) -> Self {
        self.loop_settings = Some(settings);
        self
    }

    /// Creates the output directories, loads the audit trail and spawns the
    /// loop dispatchers. Must run inside a Tokio runtime.
    pub async fn build(self) -> SniffResult<SniffOrchestrator> {
        let config = self.config;
        for dir in [
            &config.report_path,
            &config.metrics_path,
            &config.alerts_path,
            &config.health_path,
            &config.orchestrator_report_dir(),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                SniffError::infrastructure("create_dirs", format!("{}: {}", dir.display(), e))
            })?;
        }

        let degradation = DegradationTracker::new();
        let audit = AuditLog::open(config.audit_trail_path(), degradation.clone()).await?;
        let reports = ReportWriter::new(config.report_path.clone(), degradation.clone());
        let cache = Arc::new(ResultsCache::new());

        let oracle = match (self.oracle, &config.oracle) {
            (Some(oracle), _) => Some(oracle),
            (None, Some(oracle_config)) => {
                Some(Arc::new(HttpScoringOracle::new(oracle_config)?) as Arc<dyn ScoringOracle>)
            }
            (None, None) => None,
        };
        let oracle_timeout = config
            .oracle
            .as_ref()
            .map(|o| Duration::from_secs(o.timeout_seconds.max(1)))
            .unwrap_or(Duration::from_secs(15));
        let advisor = FixAdvisor::new(oracle, config.confidence_threshold, oracle_timeout);

        let mut dispatcher = AlertDispatcher::from_config(&config.notifications)?;
        for sender in self.senders {
            dispatcher = dispatcher.with_sender(sender);
        }
        let mut monitoring =
            MonitoringSystem::new(&config, degradation.clone())?.with_dispatcher(dispatcher);
        if let Some(probe) = self.probe {
            monitoring = monitoring.with_probe(probe);
        }

        let settings = self
            .loop_settings
            .unwrap_or_else(|| LoopSettings::from_config(&config));
        let sniffing = SniffingLoop::new(
            self.registry.clone(),
            Arc::clone(&cache),
            audit.clone(),
            reports,
            settings,
        );

        info!(
            domains = ?self.registry.domains(),
            oracle = advisor.is_enabled(),
            auto_fix = config.auto_fix_enabled,
            reports = %config.report_path.display(),
            "Sniff orchestrator initialized"
        );

        Ok(SniffOrchestrator {
            config,
            registry: self.registry,
            cache,
            audit,
            sniffing,
            advisor,
            monitoring: Arc::new(monitoring),
            degradation,
        })
    }
}

pub struct SniffOrchestrator {
    config: SniffConfig,
    registry: AnalyzerRegistry,
    cache: Arc<ResultsCache>,
    audit: AuditLog,
    sniffing: SniffingLoop,
    advisor: FixAdvisor,
    monitoring: Arc<MonitoringSystem>,
    degradation: DegradationTracker,
}

impl SniffOrchestrator {
    pub fn builder(config: SniffConfig, registry: AnalyzerRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            registry,
            oracle: None,
            probe: None,
            senders: Vec::new(),
            loop_settings: None,
        }
    }

    pub async fn new(
        config: SniffConfig,
        registry: AnalyzerRegistry,
        oracle: Option<Arc<dyn ScoringOracle>>,
    ) -> SniffResult<Self> {
        let mut builder = Self::builder(config, registry);
        if let Some(oracle) = oracle {
            builder = builder.oracle(oracle);
        }
        builder.build().await
    }

    pub fn config(&self) -> &SniffConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Started and stopped separately from the sniffing loop
    pub fn monitoring(&self) -> &Arc<MonitoringSystem> {
        &self.monitoring
    }

    pub fn sniffing(&self) -> &SniffingLoop {
        &self.sniffing
    }

    pub fn degradation(&self) -> &DegradationTracker {
        &self.degradation
    }

    pub fn is_running(&self) -> bool {
        self.sniffing.is_running()
    }

    pub async fn start(&self) {
        self.sniffing.start().await;
    }

    pub fn stop(&self) {
        self.sniffing.stop();
    }

    pub async fn wait_idle(&self) {
        self.sniffing.wait_idle().await;
    }

    pub async fn shutdown(&self) {
        info!("Shutting down sniff orchestrator");
        self.sniffing.shutdown().await;
        self.monitoring.stop().await;
        info!("Sniff orchestrator shut down");
    }

    async fn validate_path(path: &Path) -> SniffResult<PathBuf> {
        if path.as_os_str().is_empty() {
            return Err(SniffError::validation("file path is empty"));
        }
        let canonical = tokio::fs::canonicalize(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                SniffError::validation(format!("file not found: {}", path.display()))
            }
            _ => SniffError::validation(format!("invalid file path {}: {}", path.display(), e)),
        })?;
        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| SniffError::validation(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(SniffError::validation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(canonical)
    }

    /// Fire-and-forget request; validated before anything is enqueued
    pub async fn add_file(&self, path: impl AsRef<Path>, domains: &[String]) -> SniffResult<()> {
        let path = Self::validate_path(path.as_ref()).await?;
        self.registry.resolve(domains)?;
        self.sniffing.add_file(path, domains).await
    }

    /// Awaits the aggregated result for `path`. Never fails: validation
    /// problems, a stopped loop and similar come back as an error result.
    pub async fn run_file_sniffing(
        &self,
        path: impl AsRef<Path>,
        domains: &[String],
    ) -> AggregatedResult {
        let requested = path.as_ref();
        let outcome = async {
            let path = Self::validate_path(requested).await?;
            self.sniffing.run_file(path, domains).await
        }
        .await;

        match outcome {
            Ok(result) => result.as_ref().clone(),
            Err(e) => {
                warn!(file = %requested.display(), error = %e, kind = e.kind(), "File sniffing rejected");
                AggregatedResult::rejected(requested, domains, e.to_string())
            }
        }
    }

    /// One domain across many files, run concurrently
    pub async fn run_domain_sniffing(&self, domain: &str, files: &[PathBuf]) -> DomainSniffReport {
        if !self.registry.contains(domain) {
            let message = format!(
                "unknown domain '{}' (registered: {})",
                domain,
                self.registry.domains().join(", ")
            );
            warn!(domain, "Domain sniffing rejected");
            return DomainSniffReport::rejected(domain, message);
        }

        let requested = [domain.to_string()];
        let runs = files.iter().map(|file| self.run_file_sniffing(file, &requested));
        let results: Vec<AnalysisResult> = join_all(runs)
            .await
            .into_iter()
            .zip(files)
            .map(|(mut aggregated, file)| {
                aggregated.results.remove(domain).unwrap_or_else(|| {
                    let reason = aggregated
                        .error
                        .unwrap_or_else(|| "no result returned for domain".to_string());
                    AnalysisResult::errored(file, domain, reason)
                })
            })
            .collect();

        DomainSniffReport::from_results(domain, results)
    }

    pub async fn suggest_fixes(&self, issues: &[Issue]) -> Vec<FixSuggestion> {
        self.advisor.suggest_fixes(issues).await
    }

    pub async fn classify(&self, text: &str) -> Option<Classification> {
        self.advisor.classify(text).await
    }

    /// Applies fixes through each issue's owning analyzer, holding the file
    /// lock while the file is rewritten. With auto-fix enabled every touched
    /// file is sniffed again to confirm the issue count went down.
    pub async fn fix_issues(&self, issues: Vec<Issue>) -> FixReport {
        let mut report = FixReport {
            suggestions: self.advisor.suggest_fixes(&issues).await,
            ..FixReport::default()
        };

        let mut groups: BTreeMap<(PathBuf, String), Vec<Issue>> = BTreeMap::new();
        for issue in issues {
            let Some(file) = issue.file().map(Path::to_path_buf) else {
                debug!(issue = %issue.id, "Issue has no location, cannot fix");
                report.failed.push(issue);
                continue;
            };
            // leases are keyed by canonical path, same as the sniffing loop
            let file = match Self::validate_path(&file).await {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!(issue = %issue.id, error = %e, "Issue location is not a readable file");
                    report.failed.push(issue);
                    continue;
                }
            };
            if !self.registry.contains(&issue.domain) {
                warn!(issue = %issue.id, domain = %issue.domain, "No analyzer owns issue domain");
                report.failed.push(issue);
                continue;
            }
            groups
                .entry((file, issue.domain.clone()))
                .or_default()
                .push(issue);
        }

        let mut touched: BTreeMap<PathBuf, (BTreeSet<String>, usize)> = BTreeMap::new();
        for ((file, domain), group) in groups {
            let Some(analyzer) = self.registry.get(&domain) else {
                report.failed.extend(group);
                continue;
            };
            let submitted = group.len();
            let originals = group.clone();

            let lease = self.sniffing.lock_file(&file).await;
            let target = file.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut group = group;
                let result = analyzer.fix_issues(&target, &mut group);
                (result, group)
            })
            .await;
            drop(lease);

            match outcome {
                Ok((Ok(changed), group)) => {
                    debug!(file = %file.display(), domain = %domain, changed, "Fix pass finished");
                    let (fixed, failed): (Vec<Issue>, Vec<Issue>) =
                        group.into_iter().partition(|issue| issue.fixed);
                    if !fixed.is_empty() {
                        let entry = touched.entry(file.clone()).or_default();
                        entry.0.insert(domain.clone());
                        entry.1 += submitted;
                    }
                    report.fixed.extend(fixed);
                    report.failed.extend(failed);
                }
                Ok((Err(e), _)) => {
                    warn!(file = %file.display(), domain = %domain, error = %e, "Fix pass failed");
                    report.failed.extend(originals);
                }
                Err(e) => {
                    error!(file = %file.display(), domain = %domain, error = %e, "Fix pass panicked");
                    report.failed.extend(originals);
                }
            }
        }

        if self.config.auto_fix_enabled {
            for (file, (domains, submitted)) in touched {
                let domains: Vec<String> = domains.into_iter().collect();
                let issues_before = match self.cache_lookup(&file).await {
                    Some(cached) => domains.iter().map(|d| cached.domain_issue_count(d)).sum(),
                    None => submitted,
                };
                let rerun = self.run_file_sniffing(&file, &domains).await;
                let issues_after = rerun.issue_count;
                let improved = rerun.error.is_none() && issues_after < issues_before;
                info!(
                    file = %file.display(),
                    issues_before,
                    issues_after,
                    improved,
                    "Fix verification finished"
                );
                report.verifications.push(FixVerification {
                    file,
                    issues_before,
                    issues_after,
                    improved,
                    status: rerun.status,
                });
            }
        }

        info!(
            fixed = report.fixed.len(),
            failed = report.failed.len(),
            suggestions = report.suggestions.len(),
            "Fix request finished"
        );
        report
    }

    async fn cache_lookup(&self, path: &Path) -> Option<Arc<AggregatedResult>> {
        let key = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        self.cache.get(&key)
    }

    /// Latest complete result for `path`, if any run finished
    pub async fn cached_result(&self, path: impl AsRef<Path>) -> Option<Arc<AggregatedResult>> {
        self.cache_lookup(path.as_ref()).await
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries().await
    }

    /// Explicit retention for the audit trail; never run implicitly
    pub async fn prune_audit(&self, retention_days: u32) -> SniffResult<usize> {
        self.audit.cleanup_older_than(retention_days).await
    }

    /// Git-hook boundary: every changed file through every domain; passes
    /// only when each result is a success
    pub async fn run_hook(&self, paths: &[PathBuf]) -> HookOutcome {
        let results = join_all(paths.iter().map(|path| self.run_file_sniffing(path, &[]))).await;
        let failing: Vec<PathBuf> = results
            .iter()
            .zip(paths)
            .filter(|(result, _)| result.status != AnalysisStatus::Success)
            .map(|(_, path)| path.clone())
            .collect();
        let passed = failing.is_empty();
        info!(files = paths.len(), failing = failing.len(), passed, "Hook run finished");
        HookOutcome {
            passed,
            results,
            failing,
        }
    }
}
