//! Domain -> analyzer lookup, populated once and read-only afterwards

use crate::contracts::Analyzer;
use crate::errors::{SniffError, SniffResult};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
pub struct AnalyzerRegistryBuilder {
    analyzers: HashMap<String, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an analyzer under its own domain key. A domain may be registered once.
    pub fn register(mut self, analyzer: Arc<dyn Analyzer>) -> SniffResult<Self> {
        let domain = analyzer.domain().trim().to_string();
        if domain.is_empty() {
            return Err(SniffError::validation("analyzer domain must not be empty"));
        }
        if self.analyzers.contains_key(&domain) {
            return Err(SniffError::validation(format!(
                "analyzer for domain '{}' is already registered",
                domain
            )));
        }
        self.analyzers.insert(domain, analyzer);
        Ok(self)
    }

    pub fn build(self) -> AnalyzerRegistry {
        AnalyzerRegistry {
            analyzers: self.analyzers,
        }
    }
}

/// Frozen registry shared by reference between the loop workers
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<String, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn builder() -> AnalyzerRegistryBuilder {
        AnalyzerRegistryBuilder::new()
    }

    pub fn from_analyzers(
        analyzers: impl IntoIterator<Item = Arc<dyn Analyzer>>,
    ) -> SniffResult<Self> {
        analyzers
            .into_iter()
            .try_fold(Self::builder(), |builder, analyzer| builder.register(analyzer))
            .map(AnalyzerRegistryBuilder::build)
    }

    pub fn get(&self, domain: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(domain).cloned()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.analyzers.contains_key(domain)
    }

    /// Registered domains in sorted order
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.analyzers.keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Normalizes a requested domain set.
    ///
    /// Empty means every registered domain. Duplicates are dropped and the
    /// result is sorted. Any unknown name rejects the whole request.
    pub fn resolve(&self, requested: &[String]) -> SniffResult<Vec<String>> {
        if requested.is_empty() {
            if self.analyzers.is_empty() {
                return Err(SniffError::validation("no analyzers are registered"));
            }
            return Ok(self.domains());
        }

        let mut resolved = BTreeSet::new();
        for domain in requested {
            let domain = domain.trim();
            if !self.analyzers.contains_key(domain) {
                return Err(SniffError::validation(format!(
                    "unknown domain '{}' (registered: {})",
                    domain,
                    self.domains().join(", ")
                )));
            }
            resolved.insert(domain.to_string());
        }
        Ok(resolved.into_iter().collect())
    }
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnalysisPayload;
    use crate::errors::AnalyzerError;
    use std::path::Path;

    struct Named(&'static str);

    impl Analyzer for Named {
        fn domain(&self) -> &str {
            self.0
        }

        fn analyze(&self, _file: &Path) -> Result<AnalysisPayload, AnalyzerError> {
            Ok(AnalysisPayload::new())
        }
    }

    fn registry() -> AnalyzerRegistry {
        AnalyzerRegistry::from_analyzers([
            Arc::new(Named("security")) as Arc<dyn Analyzer>,
            Arc::new(Named("documentation")),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = AnalyzerRegistry::builder()
            .register(Arc::new(Named("unit")))
            .unwrap()
            .register(Arc::new(Named("unit")));
        assert!(matches!(result, Err(SniffError::Validation(_))));
    }

    #[test]
    fn test_resolve_empty_means_all_sorted() {
        assert_eq!(
            registry().resolve(&[]).unwrap(),
            vec!["documentation", "security"]
        );
    }

    #[test]
    fn test_resolve_dedups_and_rejects_unknown() {
        let registry = registry();
        let resolved = registry
            .resolve(&["security".into(), "security".into()])
            .unwrap();
        assert_eq!(resolved, vec!["security"]);

        let err = registry
            .resolve(&["security".into(), "bogus_domain".into()])
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("bogus_domain"));
    }
}
