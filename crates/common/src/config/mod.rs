//! Engine configuration
//!
//! Loaded from TOML or JSON by [`ConfigLoader`], checked by [`ConfigValidator`].
//! Every section has defaults so an empty file is a valid configuration.

mod loader;
mod validator;

pub use loader::{ConfigLoader, ConfigSource};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SniffConfig {
    /// Re-run sniffing on files touched by `fix_issues` to verify the fix
    pub auto_fix_enabled: bool,
    pub report_path: PathBuf,
    pub metrics_path: PathBuf,
    pub alerts_path: PathBuf,
    pub health_path: PathBuf,
    /// Fix suggestions below this confidence are never surfaced
    pub confidence_threshold: f64,
    pub retention_days: u32,
    /// Upper bound on concurrently running analyzer invocations
    pub max_workers: usize,
    pub per_domain_timeout_seconds: u64,
    /// Capacity of the ingestion queue and of each domain queue
    pub queue_capacity: usize,
    pub monitoring: MonitoringConfig,
    pub notifications: NotificationConfig,
    pub oracle: Option<OracleConfig>,
    pub logging: LoggingSettings,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            auto_fix_enabled: false,
            report_path: PathBuf::from("reports"),
            metrics_path: PathBuf::from("metrics"),
            alerts_path: PathBuf::from("alerts"),
            health_path: PathBuf::from("health"),
            confidence_threshold: 0.8,
            retention_days: 7,
            max_workers: num_cpus::get().clamp(1, 8),
            per_domain_timeout_seconds: 60,
            queue_capacity: 256,
            monitoring: MonitoringConfig::default(),
            notifications: NotificationConfig::default(),
            oracle: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl SniffConfig {
    /// Places every output directory under `root`
    pub fn rooted_at(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.report_path = root.join("reports");
        self.metrics_path = root.join("metrics");
        self.alerts_path = root.join("alerts");
        self.health_path = root.join("health");
        self
    }

    pub fn per_domain_timeout(&self) -> Duration {
        Duration::from_secs(self.per_domain_timeout_seconds)
    }

    /// `reports/mcp`, home of aggregated reports and the audit trail
    pub fn orchestrator_report_dir(&self) -> PathBuf {
        self.report_path.join("mcp")
    }

    pub fn audit_trail_path(&self) -> PathBuf {
        self.orchestrator_report_dir().join("audit_trail.json")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_interval_seconds: u64,
    pub health_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Percentages in (0, 100]
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
    pub services: Vec<ServiceCheck>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_interval_seconds: 60,
            health_interval_seconds: 300,
            cleanup_interval_seconds: 3600,
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            services: Vec::new(),
        }
    }
}

/// A dependent service probed by the health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    #[serde(flatten)]
    pub target: ServiceTarget,
    #[serde(default = "default_service_timeout")]
    pub timeout_seconds: u64,
}

fn default_service_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceTarget {
    Tcp { address: String },
    Http { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Always write alerts to the tracing log
    pub log: bool,
    pub slack: Option<SlackSettings>,
    pub email: Option<EmailSettings>,
    pub webhook: Option<WebhookSettings>,
    /// Upper bound for a single channel send
    pub send_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            log: true,
            slack: None,
            email: None,
            webhook: None,
            send_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackSettings {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub mention_users: Vec<String>,
}

/// Email goes out through an HTTP mail relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub relay_url: String,
    pub from: String,
    pub to: Vec<String>,
    /// Name of the environment variable holding the relay API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

/// Remote classifier used as the scoring oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub endpoint: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_oracle_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
