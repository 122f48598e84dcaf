//! Append-only audit trail, owned by a single writer task

use crate::degradation::DegradationTracker;
use crate::storage::{with_one_retry, write_json_atomic};
use chrono::{Duration as ChronoDuration, Utc};
use sniff_core::{AuditEntry, SniffError, SniffResult};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

enum AuditCommand {
    Append {
        entry: AuditEntry,
        reply: oneshot::Sender<SniffResult<usize>>,
    },
    Entries {
        reply: oneshot::Sender<Vec<AuditEntry>>,
    },
    Prune {
        retention_days: u32,
        reply: oneshot::Sender<SniffResult<usize>>,
    },
}

/// Handle to the audit writer.
///
/// Every mutation goes through one task, so concurrent fan-in completions can
/// never interleave their writes. The trail file is rewritten through a temp
/// file and a rename on each append.
#[derive(Clone)]
pub struct AuditLog {
    commands: mpsc::Sender<AuditCommand>,
    path: PathBuf,
}

struct AuditWriter {
    path: PathBuf,
    entries: Vec<AuditEntry>,
    degradation: DegradationTracker,
}

impl AuditLog {
    /// Loads the existing trail (if any) and spawns the writer task
    pub async fn open(path: impl Into<PathBuf>, degradation: DegradationTracker) -> SniffResult<Self> {
        let path = path.into();
        let entries = load_trail(&path).await?;
        info!(path = %path.display(), entries = entries.len(), "Audit trail opened");

        let (commands, receiver) = mpsc::channel(64);
        let writer = AuditWriter {
            path: path.clone(),
            entries,
            degradation,
        };
        tokio::spawn(writer.run(receiver));
        Ok(Self { commands, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry; returns the trail length after the append
    pub async fn append(&self, entry: AuditEntry) -> SniffResult<usize> {
        let (reply, response) = oneshot::channel();
        self.send(AuditCommand::Append { entry, reply }).await?;
        response.await.map_err(|_| writer_gone())?
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        let (reply, response) = oneshot::channel();
        if self.send(AuditCommand::Entries { reply }).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.entries().await.len()
    }

    /// Explicit retention: drops entries older than `retention_days`
    pub async fn cleanup_older_than(&self, retention_days: u32) -> SniffResult<usize> {
        let (reply, response) = oneshot::channel();
        self.send(AuditCommand::Prune {
            retention_days,
            reply,
        })
        .await?;
        response.await.map_err(|_| writer_gone())?
    }

    async fn send(&self, command: AuditCommand) -> SniffResult<()> {
        self.commands.send(command).await.map_err(|_| writer_gone())
    }
}

fn writer_gone() -> SniffError {
    SniffError::Internal("audit writer task has stopped".to_string())
}

async fn load_trail(path: &Path) -> SniffResult<Vec<AuditEntry>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| SniffError::infrastructure("audit_load", format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(SniffError::infrastructure("audit_load", e)),
    }
}

impl AuditWriter {
    async fn run(mut self, mut commands: mpsc::Receiver<AuditCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                AuditCommand::Append { entry, reply } => {
                    self.entries.push(entry);
                    let outcome = self.persist("audit_append").await.map(|_| self.entries.len());
                    let _ = reply.send(outcome);
                }
                AuditCommand::Entries { reply } => {
                    let _ = reply.send(self.entries.clone());
                }
                AuditCommand::Prune {
                    retention_days,
                    reply,
                } => {
                    let _ = reply.send(self.prune(retention_days).await);
                }
            }
        }
        debug!(path = %self.path.display(), "Audit writer stopped");
    }

    /// Entries stay in memory when the write fails; the next successful
    /// persist writes them out.
    async fn persist(&self, operation: &str) -> SniffResult<()> {
        let result = with_one_retry(operation, || write_json_atomic(&self.path, &self.entries)).await;
        result.map_err(|e| {
            self.degradation
                .record(operation, format!("{}: {}", self.path.display(), e));
            SniffError::infrastructure(operation, e)
        })
    }

    async fn prune(&mut self, retention_days: u32) -> SniffResult<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let before = self.entries.len();
        self.entries.retain(|entry| entry.timestamp >= cutoff);
        let removed = before - self.entries.len();

        if removed > 0 {
            if let Err(e) = self.persist("audit_prune").await {
                error!(error = %e, "Audit retention cleanup could not be persisted");
                return Err(e);
            }
        }
        info!(
            removed,
            remaining = self.entries.len(),
            retention_days,
            "Audit retention cleanup finished"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_core::AnalysisStatus;
    use tempfile::TempDir;

    fn entry(file: &str) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            file: PathBuf::from(file),
            domain: "security".to_string(),
            status: AnalysisStatus::Success,
            issue_count: 0,
            report_path: PathBuf::from("reports/mcp/r.json"),
        }
    }

    #[tokio::test]
    async fn test_append_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp/audit_trail.json");
        let log = AuditLog::open(&path, DegradationTracker::new()).await.unwrap();

        assert_eq!(log.append(entry("a.py")).await.unwrap(), 1);
        assert_eq!(log.append(entry("b.py")).await.unwrap(), 2);

        let reopened = AuditLog::open(&path, DegradationTracker::new()).await.unwrap();
        assert_eq!(reopened.entries().await, log.entries().await);
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("trail.json"), DegradationTracker::new())
            .await
            .unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move { log.append(entry(&format!("f{}.py", i))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let on_disk: Vec<AuditEntry> =
            serde_json::from_slice(&std::fs::read(log.path()).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 20);
    }

    #[tokio::test]
    async fn test_prune_only_removes_old_entries() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("trail.json"), DegradationTracker::new())
            .await
            .unwrap();
        let mut old = entry("old.py");
        old.timestamp = Utc::now() - ChronoDuration::days(30);
        log.append(old).await.unwrap();
        log.append(entry("new.py")).await.unwrap();

        assert_eq!(log.cleanup_older_than(7).await.unwrap(), 1);
        let remaining = log.entries().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file, PathBuf::from("new.py"));
    }

    #[tokio::test]
    async fn test_corrupt_trail_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trail.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = AuditLog::open(&path, DegradationTracker::new()).await.err().unwrap();
        assert_eq!(err.kind(), "infrastructure");
    }

    #[tokio::test]
    async fn test_failed_write_is_recorded_as_degradation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("trail.json");
        let tracker = DegradationTracker::new();
        let log = AuditLog::open(&path, tracker.clone()).await.unwrap();
        // the trail's parent becomes a regular file, so every write fails
        std::fs::write(dir.path().join("sub"), "").unwrap();

        let err = log.append(entry("a.py")).await.unwrap_err();
        assert_eq!(err.kind(), "infrastructure");
        assert_eq!(tracker.len(), 1);
        assert_eq!(log.len().await, 1);
    }
}
