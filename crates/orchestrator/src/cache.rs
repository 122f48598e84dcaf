//! Latest aggregated result per file

use dashmap::DashMap;
use sniff_core::AggregatedResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Each entry is swapped as a whole `Arc`, so a reader sees either the
/// previous run or the complete new one, never a mix.
#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: DashMap<PathBuf, Arc<AggregatedResult>>,
}

impl ResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for the result's file; returns the previous one
    pub fn insert(&self, result: Arc<AggregatedResult>) -> Option<Arc<AggregatedResult>> {
        self.entries.insert(result.file.clone(), result)
    }

    pub fn get(&self, file: &Path) -> Option<Arc<AggregatedResult>> {
        self.entries.get(file).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, file: &Path) -> Option<Arc<AggregatedResult>> {
        self.entries.remove(file).map(|(_, result)| result)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_core::AnalysisResult;

    #[test]
    fn test_insert_replaces_never_merges() {
        let cache = ResultsCache::new();
        let both = vec!["documentation".to_string(), "security".to_string()];
        let first = AggregatedResult::from_results(
            "a.py",
            &both,
            vec![
                AnalysisResult::errored("a.py", "security", "x"),
                AnalysisResult::errored("a.py", "documentation", "x"),
            ],
        );
        cache.insert(Arc::new(first));

        let only_security = vec!["security".to_string()];
        let second = AggregatedResult::from_results(
            "a.py",
            &only_security,
            vec![AnalysisResult::errored("a.py", "security", "y")],
        );
        let previous = cache.insert(Arc::new(second)).unwrap();
        assert_eq!(previous.results.len(), 2);

        let current = cache.get(Path::new("a.py")).unwrap();
        assert_eq!(current.results.len(), 1);
        assert_eq!(cache.paths(), vec![PathBuf::from("a.py")]);
    }
}
