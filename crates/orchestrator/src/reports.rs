//! Per-domain and per-run JSON reports

use crate::degradation::DegradationTracker;
use crate::storage::{sanitize, with_one_retry, write_new_json};
use sniff_core::{AggregatedResult, AnalysisResult};
use std::path::{Path, PathBuf};

/// Directory under the report root holding run reports and the audit trail
pub const RUN_REPORT_DIR: &str = "mcp";

#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
    degradation: DegradationTracker,
}

impl ReportWriter {
    pub fn new(root: impl Into<PathBuf>, degradation: DegradationTracker) -> Self {
        Self {
            root: root.into(),
            degradation,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prefix(file: &Path) -> String {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("report_{}", sanitize(&stem))
    }

    /// `reports/<domain>/report_<stem>_<ts>.json`
    pub async fn write_domain_report(&self, result: &AnalysisResult) -> Option<PathBuf> {
        let dir = self.root.join(sanitize(&result.domain));
        self.write(&dir, &Self::prefix(&result.file), result, "domain_report")
            .await
    }

    /// `reports/mcp/report_<stem>_<ts>.json`
    pub async fn write_run_report(&self, result: &AggregatedResult) -> Option<PathBuf> {
        let dir = self.root.join(RUN_REPORT_DIR);
        self.write(&dir, &Self::prefix(&result.file), result, "run_report")
            .await
    }

    /// Writes every domain report of the run, then the run report.
    /// Returns the run report path when it was written.
    pub async fn write_all(&self, result: &AggregatedResult) -> Option<PathBuf> {
        for domain_result in result.results.values() {
            self.write_domain_report(domain_result).await;
        }
        self.write_run_report(result).await
    }

    async fn write<T: serde::Serialize>(
        &self,
        dir: &Path,
        prefix: &str,
        value: &T,
        operation: &str,
    ) -> Option<PathBuf> {
        let now = chrono::Utc::now();
        match with_one_retry(operation, || write_new_json(dir, prefix, now, value)).await {
            Ok(path) => Some(path),
            Err(e) => {
                self.degradation
                    .record(operation, format!("{}: {}", dir.display(), e));
                None
            }
        }
    }
}
