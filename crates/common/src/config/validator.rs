use super::{MonitoringConfig, NotificationConfig, SniffConfig};
use anyhow::{bail, Result};
use tracing::warn;

pub struct ConfigValidator;

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &SniffConfig) -> Result<()> {
        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            bail!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                config.confidence_threshold
            );
        }
        if config.max_workers == 0 {
            bail!("max_workers must be greater than 0");
        }
        if config.per_domain_timeout_seconds == 0 {
            bail!("per_domain_timeout_seconds must be greater than 0");
        }
        if config.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }
        if config.retention_days == 0 {
            bail!("retention_days must be greater than 0");
        }

        self.validate_monitoring(&config.monitoring)?;
        self.validate_notifications(&config.notifications);
        Ok(())
    }

    fn validate_monitoring(&self, config: &MonitoringConfig) -> Result<()> {
        for (name, value) in [
            ("cpu_threshold", config.cpu_threshold),
            ("memory_threshold", config.memory_threshold),
            ("disk_threshold", config.disk_threshold),
        ] {
            if value <= 0.0 || value > 100.0 {
                bail!("monitoring.{} must be in (0, 100], got {}", name, value);
            }
        }

        for (name, value) in [
            ("metrics_interval_seconds", config.metrics_interval_seconds),
            ("health_interval_seconds", config.health_interval_seconds),
            ("cleanup_interval_seconds", config.cleanup_interval_seconds),
        ] {
            if value == 0 {
                bail!("monitoring.{} must be greater than 0", name);
            }
        }

        for service in &config.services {
            if service.name.trim().is_empty() {
                bail!("monitoring.services entries need a name");
            }
        }
        Ok(())
    }

    fn validate_notifications(&self, config: &NotificationConfig) {
        if let Some(email) = &config.email {
            if email.to.is_empty() {
                warn!("Email notifications configured without recipients");
            }
        }
        if !config.log && config.slack.is_none() && config.email.is_none() && config.webhook.is_none()
        {
            warn!("No notification channel enabled; alerts will only be persisted");
        }
    }
}
