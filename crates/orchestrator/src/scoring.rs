//! Boundary between the engine and the AI scoring oracle
//!
//! The oracle is optional and untrusted: it may be missing, slow, or down.
//! [`FixAdvisor`] turns all of those into "no suggestions" plus a warning, and
//! applies the confidence gate before anything reaches a caller.

use async_trait::async_trait;
use common::OracleConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sniff_core::{Classification, FixSuggestion, Issue, OracleError, ScoringOracle, SniffError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct FixAdvisor {
    oracle: Option<Arc<dyn ScoringOracle>>,
    confidence_threshold: f64,
    call_timeout: Duration,
}

impl FixAdvisor {
    pub fn new(
        oracle: Option<Arc<dyn ScoringOracle>>,
        confidence_threshold: f64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            confidence_threshold,
            call_timeout,
        }
    }

    pub fn disabled(confidence_threshold: f64) -> Self {
        Self::new(None, confidence_threshold, Duration::from_secs(15))
    }

    pub fn is_enabled(&self) -> bool {
        self.oracle.is_some()
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    fn passes_gate(&self, confidence: f64) -> bool {
        confidence.is_finite() && confidence >= self.confidence_threshold
    }

    /// Ranked suggestions for the unfixed issues, highest confidence first.
    ///
    /// Issues are only read. Any oracle failure degrades the whole pass to an
    /// empty result.
    pub async fn suggest_fixes(&self, issues: &[Issue]) -> Vec<FixSuggestion> {
        let Some(oracle) = &self.oracle else {
            debug!("No scoring oracle configured, skipping fix suggestions");
            return Vec::new();
        };
        let candidates: Vec<&Issue> = issues.iter().filter(|i| !i.fixed).collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let calls = candidates.iter().map(|issue| async move {
            match timeout(self.call_timeout, oracle.suggest(issue)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.call_timeout)),
            }
        });

        let mut suggestions = Vec::with_capacity(candidates.len());
        for (issue, outcome) in candidates.iter().zip(join_all(calls).await) {
            match outcome {
                Ok(mut suggestion) => {
                    if suggestion.issue_id.is_empty() {
                        suggestion.issue_id = issue.id.clone();
                    }
                    if self.passes_gate(suggestion.confidence) {
                        suggestions.push(suggestion);
                    } else {
                        debug!(
                            issue = %issue.id,
                            confidence = suggestion.confidence,
                            threshold = self.confidence_threshold,
                            "Suggestion below confidence threshold dropped"
                        );
                    }
                }
                Err(e) => {
                    warn!(oracle = oracle.name(), error = %e, "Scoring oracle failed, returning no suggestions");
                    return Vec::new();
                }
            }
        }

        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        info!(
            requested = candidates.len(),
            surfaced = suggestions.len(),
            threshold = self.confidence_threshold,
            "Fix suggestions ready"
        );
        suggestions
    }

    /// Label for `text`, or `None` when the oracle is absent, failing, or
    /// below the confidence threshold
    pub async fn classify(&self, text: &str) -> Option<Classification> {
        let oracle = self.oracle.as_ref()?;
        let outcome = match timeout(self.call_timeout, oracle.score(text)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.call_timeout)),
        };
        match outcome {
            Ok(classification) if self.passes_gate(classification.confidence) => {
                Some(classification)
            }
            Ok(classification) => {
                debug!(label = %classification.label, confidence = classification.confidence, "Classification below threshold");
                None
            }
            Err(e) => {
                warn!(oracle = oracle.name(), error = %e, "Scoring oracle failed, skipping classification");
                None
            }
        }
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct SuggestRequest<'a> {
    issue: &'a Issue,
}

#[derive(Deserialize)]
struct SuggestResponse {
    confidence: f64,
    suggested_change: String,
    #[serde(default)]
    description: String,
}

/// JSON client for a remote classifier exposing `POST /score` and `POST /suggest`
pub struct HttpScoringOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpScoringOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, SniffError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SniffError::infrastructure("oracle_client", e))?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<R, OracleError> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.endpoint, route))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::Unavailable(format!("{} returned {}", route, status)));
        }
        if !status.is_success() {
            return Err(OracleError::Inference(format!("{} returned {}", route, status)));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| OracleError::Inference(format!("invalid {} response: {}", route, e)))
    }
}

#[async_trait]
impl ScoringOracle for HttpScoringOracle {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, text: &str) -> Result<Classification, OracleError> {
        self.post("score", &ScoreRequest { text }).await
    }

    async fn suggest(&self, issue: &Issue) -> Result<FixSuggestion, OracleError> {
        let response: SuggestResponse = self.post("suggest", &SuggestRequest { issue }).await?;
        Ok(FixSuggestion {
            issue_id: issue.id.clone(),
            confidence: response.confidence,
            suggested_change: response.suggested_change,
            description: response.description,
        })
    }
}
