//! Health check results and dependent-service reachability

use chrono::{DateTime, Utc};
use common::{ServiceCheck, ServiceTarget};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn worst(states: impl IntoIterator<Item = HealthState>) -> HealthState {
        states.into_iter().max().unwrap_or(HealthState::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl CheckResult {
    /// A utilisation figure strictly above its threshold is a breach
    pub fn threshold(name: &str, value: f64, threshold: f64) -> Self {
        let breached = value > threshold;
        Self {
            name: name.to_string(),
            status: if breached {
                HealthState::Unhealthy
            } else {
                HealthState::Healthy
            },
            message: if breached {
                format!("{} at {:.1}% exceeds {:.1}%", name, value, threshold)
            } else {
                format!("{} at {:.1}%", name, value)
            },
            value: Some(value),
            threshold: Some(threshold),
        }
    }

    pub fn is_breach(&self) -> bool {
        self.status != HealthState::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub status: HealthState,
    pub checks: Vec<CheckResult>,
    /// Infrastructure failures reported since the previous health pass
    pub degraded: Vec<String>,
    pub alerts_raised: usize,
}

/// TCP connect or HTTP GET, bounded by the check's timeout
pub async fn check_service(check: &ServiceCheck, http: &reqwest::Client) -> CheckResult {
    let limit = Duration::from_secs(check.timeout_seconds.max(1));
    let outcome: Result<String, String> = match &check.target {
        ServiceTarget::Tcp { address } => match timeout(limit, TcpStream::connect(address)).await {
            Ok(Ok(_)) => Ok(format!("connected to {}", address)),
            Ok(Err(e)) => Err(format!("connect to {} failed: {}", address, e)),
            Err(_) => Err(format!("connect to {} timed out after {:?}", address, limit)),
        },
        ServiceTarget::Http { url } => match timeout(limit, http.get(url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                Ok(format!("{} answered {}", url, response.status()))
            }
            Ok(Ok(response)) => Err(format!("{} answered {}", url, response.status())),
            Ok(Err(e)) => Err(format!("request to {} failed: {}", url, e)),
            Err(_) => Err(format!("request to {} timed out after {:?}", url, limit)),
        },
    };

    let (status, message) = match outcome {
        Ok(message) => (HealthState::Healthy, message),
        Err(message) => (HealthState::Unhealthy, message),
    };
    CheckResult {
        name: format!("service:{}", check.name),
        status,
        message,
        value: None,
        threshold: None,
    }
}
