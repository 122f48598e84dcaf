use super::{SlackSettings, SniffConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Default,
}

pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_paths: Self::default_config_paths(),
            env_prefix: "SNIFF_".to_string(),
        }
    }

    /// Puts an explicit path ahead of the search list
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_paths.insert(0, path.into());
        self
    }

    /// Searches only the given paths
    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config_paths = paths;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".sniffrc.toml"),
            PathBuf::from("sniff.toml"),
            PathBuf::from("sniff.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sniff").join("config.toml"));
        }
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".config").join("sniff").join("config.toml"));
        }

        paths
    }

    /// File (first hit wins), then environment overrides
    pub async fn load(&self) -> Result<(SniffConfig, ConfigSource)> {
        let (config, source) = self.load_base_config().await?;
        let config = self.apply_env_overrides(config)?;
        Ok((config, source))
    }

    async fn load_base_config(&self) -> Result<(SniffConfig, ConfigSource)> {
        for path in &self.config_paths {
            if !path.exists() {
                continue;
            }
            match self.load_file(path).await {
                Ok(config) => {
                    info!("Loaded configuration from: {}", path.display());
                    return Ok((config, ConfigSource::File(path.clone())));
                }
                Err(e) => {
                    warn!("Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        debug!("No configuration file found, using defaults");
        Ok((SniffConfig::default(), ConfigSource::Default))
    }

    pub async fn load_file(&self, path: &Path) -> Result<SniffConfig> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" | "" => toml::from_str(&content).context("Failed to parse TOML config"),
            "json" => serde_json::from_str(&content).context("Failed to parse JSON config"),
            _ => toml::from_str(&content)
                .or_else(|_| serde_json::from_str(&content))
                .context("Failed to parse config file"),
        }
    }

    fn env(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", self.env_prefix, key)).ok()
    }

    fn env_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.env(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid {}{}={}: {}", self.env_prefix, key, raw, e)),
            None => Ok(None),
        }
    }

    fn apply_env_overrides(&self, mut config: SniffConfig) -> Result<SniffConfig> {
        if let Some(enabled) = self.env_parsed::<bool>("AUTO_FIX_ENABLED")? {
            config.auto_fix_enabled = enabled;
        }
        if let Some(threshold) = self.env_parsed::<f64>("CONFIDENCE_THRESHOLD")? {
            config.confidence_threshold = threshold;
        }
        if let Some(workers) = self.env_parsed::<usize>("MAX_WORKERS")? {
            config.max_workers = workers;
        }
        if let Some(timeout) = self.env_parsed::<u64>("PER_DOMAIN_TIMEOUT_SECONDS")? {
            config.per_domain_timeout_seconds = timeout;
        }
        if let Some(days) = self.env_parsed::<u32>("RETENTION_DAYS")? {
            config.retention_days = days;
        }
        if let Some(path) = self.env("REPORT_PATH") {
            config.report_path = PathBuf::from(path);
        }
        if let Some(level) = self.env("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(webhook_url) = self.env("SLACK_WEBHOOK_URL") {
            match config.notifications.slack.as_mut() {
                Some(slack) => slack.webhook_url = webhook_url,
                None => {
                    config.notifications.slack = Some(SlackSettings {
                        webhook_url,
                        channel: None,
                        mention_users: Vec::new(),
                    })
                }
            }
        }
        Ok(config)
    }
}
