//! Alerts and the channels they are pushed through

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EmailSettings, NotificationConfig, SlackSettings, WebhookSettings};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sniff_core::{SniffError, SniffResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    /// Check that raised the alert, e.g. `cpu` or `service:db`
    pub source: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        source: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            source: source.into(),
            title: title.into(),
            message: message.into(),
            value: None,
            threshold: None,
        }
    }

    pub fn with_reading(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel_name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<()>;
}

pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn channel_name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Low => {
                info!(source = %alert.source, alert_id = %alert.id, "ALERT {}: {}", alert.title, alert.message)
            }
            AlertSeverity::Medium => {
                warn!(source = %alert.source, alert_id = %alert.id, "ALERT {}: {}", alert.title, alert.message)
            }
            AlertSeverity::High => {
                error!(source = %alert.source, alert_id = %alert.id, "ALERT {}: {}", alert.title, alert.message)
            }
        }
        Ok(())
    }
}

async fn ensure_success(channel: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("{} returned {}: {}", channel, status, body))
}

pub struct SlackSender {
    settings: SlackSettings,
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(settings: SlackSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    fn channel_name(&self) -> &str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let (emoji, color) = match alert.severity {
            AlertSeverity::Low => (":information_source:", "#36a64f"),
            AlertSeverity::Medium => (":warning:", "#ff9900"),
            AlertSeverity::High => (":rotating_light:", "#ff0000"),
        };
        let mentions = if self.settings.mention_users.is_empty() {
            String::new()
        } else {
            let users: Vec<String> = self
                .settings
                .mention_users
                .iter()
                .map(|u| format!("<@{u}>"))
                .collect();
            format!(" cc: {}", users.join(" "))
        };

        let payload = serde_json::json!({
            "channel": self.settings.channel,
            "attachments": [{
                "color": color,
                "title": format!("{} {}", emoji, alert.title),
                "text": format!("{}{}", alert.message, mentions),
                "fields": [
                    { "title": "Source", "value": alert.source, "short": true },
                    { "title": "Severity", "value": alert.severity.to_string(), "short": true }
                ],
                "footer": "sniff monitoring",
                "ts": alert.timestamp.timestamp()
            }]
        });

        let response = self
            .client
            .post(&self.settings.webhook_url)
            .json(&payload)
            .send()
            .await?;
        ensure_success("slack webhook", response).await
    }
}

/// Email through an HTTP mail relay (`POST relay_url` with a JSON message)
pub struct EmailSender {
    settings: EmailSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EmailSender {
    pub fn new(settings: EmailSettings, client: reqwest::Client) -> Self {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self {
            settings,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel_name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        if self.settings.to.is_empty() {
            return Err(anyhow!("email channel has no recipients"));
        }
        let payload = serde_json::json!({
            "from": self.settings.from,
            "to": self.settings.to,
            "subject": format!("[{}] {}", alert.severity.to_string().to_uppercase(), alert.title),
            "text": format!(
                "{}\n\nsource: {}\nalert: {}\ntime: {}",
                alert.message,
                alert.source,
                alert.id,
                alert.timestamp.to_rfc3339()
            ),
        });
        let mut request = self.client.post(&self.settings.relay_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        ensure_success("mail relay", response).await
    }
}

pub struct WebhookSender {
    url: String,
    headers: BTreeMap<String, String>,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(settings: WebhookSettings, client: reqwest::Client) -> Self {
        let auth_token = settings
            .auth_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self {
            url: settings.url,
            headers: settings.headers,
            auth_token,
            client,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel_name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let mut request = self.client.post(&self.url).json(alert);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        ensure_success("webhook", response).await
    }
}

/// Fans an alert out to every configured channel
#[derive(Clone)]
pub struct AlertDispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
    send_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            senders: Vec::new(),
            send_timeout,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> SniffResult<Self> {
        let send_timeout = Duration::from_secs(config.send_timeout_seconds.max(1));
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .map_err(|e| SniffError::infrastructure("notification_client", e))?;

        let mut dispatcher = Self::new(send_timeout);
        if config.log {
            dispatcher = dispatcher.with_sender(Arc::new(LogSender));
        }
        if let Some(slack) = &config.slack {
            dispatcher = dispatcher.with_sender(Arc::new(SlackSender::new(slack.clone(), client.clone())));
        }
        if let Some(email) = &config.email {
            dispatcher = dispatcher.with_sender(Arc::new(EmailSender::new(email.clone(), client.clone())));
        }
        if let Some(webhook) = &config.webhook {
            dispatcher = dispatcher.with_sender(Arc::new(WebhookSender::new(webhook.clone(), client)));
        }
        Ok(dispatcher)
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn channels(&self) -> Vec<&str> {
        self.senders.iter().map(|s| s.channel_name()).collect()
    }

    /// Sends to all channels at once. Failures and timeouts are logged and
    /// otherwise ignored; returns how many channels accepted the alert.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        let sends = self.senders.iter().map(|sender| async move {
            match timeout(self.send_timeout, sender.send(alert)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(channel = sender.channel_name(), alert_id = %alert.id, error = %e, "Alert delivery failed");
                    false
                }
                Err(_) => {
                    warn!(channel = sender.channel_name(), alert_id = %alert.id, timeout_ms = self.send_timeout.as_millis() as u64, "Alert delivery timed out");
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|delivered| *delivered).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl NotificationSender for Failing {
        fn channel_name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            Err(anyhow!("channel down"))
        }
    }

    struct Hanging;

    #[async_trait]
    impl NotificationSender for Hanging {
        fn channel_name(&self) -> &str {
            "hanging"
        }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_failures_do_not_propagate() {
        let dispatcher = AlertDispatcher::new(Duration::from_millis(50))
            .with_sender(Arc::new(Failing))
            .with_sender(Arc::new(Hanging))
            .with_sender(Arc::new(LogSender));
        let alert = Alert::new(AlertSeverity::High, "cpu", "CPU usage high", "95% > 80%");

        let started = std::time::Instant::now();
        assert_eq!(dispatcher.dispatch(&alert).await, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_from_config_picks_channels() {
        let config = NotificationConfig {
            slack: Some(SlackSettings {
                webhook_url: "http://localhost:9/hook".into(),
                channel: None,
                mention_users: Vec::new(),
            }),
            ..NotificationConfig::default()
        };
        let dispatcher = AlertDispatcher::from_config(&config).unwrap();
        assert_eq!(dispatcher.channels(), vec!["log", "slack"]);
    }

    #[test]
    fn test_alert_serializes_lowercase_severity() {
        let alert = Alert::new(AlertSeverity::High, "cpu", "t", "m").with_reading(95.0, 80.0);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severity"], "high");
        assert_eq!(json["value"], 95.0);
    }
}
