//! Infrastructure failures waiting to be surfaced by the next health check

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub reason: String,
}

/// Shared sink for write failures that survived their retry
#[derive(Debug, Clone, Default)]
pub struct DegradationTracker {
    entries: Arc<Mutex<Vec<DegradedEntry>>>,
}

impl DegradationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: impl Into<String>, reason: impl ToString) {
        let entry = DegradedEntry {
            timestamp: Utc::now(),
            operation: operation.into(),
            reason: reason.to_string(),
        };
        error!(operation = %entry.operation, reason = %entry.reason, "Infrastructure degraded");
        self.entries.lock().push(entry);
    }

    /// Takes every recorded entry; each one is reported once
    pub fn drain(&self) -> Vec<DegradedEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn snapshot(&self) -> Vec<DegradedEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_reports_once() {
        let tracker = DegradationTracker::new();
        let clone = tracker.clone();
        clone.record("audit_append", "disk full");
        assert_eq!(tracker.len(), 1);

        let drained = tracker.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].operation, "audit_append");
        assert!(tracker.is_empty());
    }
}
