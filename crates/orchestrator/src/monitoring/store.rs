//! Metric, alert and health snapshots on disk

use super::alerts::Alert;
use super::health::HealthReport;
use super::probe::MetricSnapshot;
use crate::degradation::DegradationTracker;
use crate::storage::{remove_snapshots_before, with_one_retry, write_new_json};
use chrono::{Duration as ChronoDuration, Utc};
use common::SniffConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const METRICS_PREFIX: &str = "metrics";
const ALERT_PREFIX: &str = "alert";
const HEALTH_PREFIX: &str = "health";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    metrics_dir: PathBuf,
    alerts_dir: PathBuf,
    health_dir: PathBuf,
    degradation: DegradationTracker,
}

impl SnapshotStore {
    pub fn new(config: &SniffConfig, degradation: DegradationTracker) -> Self {
        Self {
            metrics_dir: config.metrics_path.clone(),
            alerts_dir: config.alerts_path.clone(),
            health_dir: config.health_path.clone(),
            degradation,
        }
    }

    pub fn alerts_dir(&self) -> &Path {
        &self.alerts_dir
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn health_dir(&self) -> &Path {
        &self.health_dir
    }

    pub async fn save_metrics(&self, snapshot: &MetricSnapshot) -> Option<PathBuf> {
        self.save(&self.metrics_dir, METRICS_PREFIX, snapshot).await
    }

    pub async fn save_alert(&self, alert: &Alert) -> Option<PathBuf> {
        self.save(&self.alerts_dir, ALERT_PREFIX, alert).await
    }

    pub async fn save_health(&self, report: &HealthReport) -> Option<PathBuf> {
        self.save(&self.health_dir, HEALTH_PREFIX, report).await
    }

    async fn save<T: Serialize>(&self, dir: &Path, prefix: &str, value: &T) -> Option<PathBuf> {
        let now = Utc::now();
        let operation = format!("{}_snapshot", prefix);
        match with_one_retry(&operation, || write_new_json(dir, prefix, now, value)).await {
            Ok(path) => {
                debug!(path = %path.display(), "Snapshot written");
                Some(path)
            }
            Err(e) => {
                self.degradation
                    .record(operation, format!("{}: {}", dir.display(), e));
                None
            }
        }
    }

    /// Deletes snapshots older than `retention_days` from all three directories
    pub async fn cleanup(&self, retention_days: u32) -> usize {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let mut removed = 0;
        for (dir, prefix) in [
            (&self.metrics_dir, METRICS_PREFIX),
            (&self.alerts_dir, ALERT_PREFIX),
            (&self.health_dir, HEALTH_PREFIX),
        ] {
            match remove_snapshots_before(dir, prefix, cutoff).await {
                Ok(count) => removed += count,
                Err(e) => warn!(dir = %dir.display(), error = %e, "Snapshot cleanup failed"),
            }
        }
        info!(removed, retention_days, "Snapshot retention cleanup finished");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::AlertSeverity;
    use crate::storage::timestamp_token;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_keeps_recent_snapshots() {
        let dir = TempDir::new().unwrap();
        let config = SniffConfig::default().rooted_at(dir.path());
        let store = SnapshotStore::new(&config, DegradationTracker::new());

        let alert = Alert::new(AlertSeverity::Low, "test", "t", "m");
        let fresh = store.save_alert(&alert).await.unwrap();
        let stale_at = Utc::now() - ChronoDuration::days(10);
        let stale = store
            .alerts_dir()
            .join(format!("alert_{}.json", timestamp_token(stale_at)));
        std::fs::write(&stale, "{}").unwrap();
        std::fs::write(store.alerts_dir().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.cleanup(7).await, 1);
        assert!(fresh.exists());
        assert!(!stale.exists());
        assert!(store.alerts_dir().join("notes.txt").exists());
    }
}
