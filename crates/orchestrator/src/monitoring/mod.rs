//! Host monitoring, independent of the sniffing pipeline
//!
//! Three periodic loops: metric collection, health checks (thresholds,
//! dependent services, infrastructure degradation), and snapshot retention.
//! Each loop skips missed ticks and exits when the system is stopped.

pub mod alerts;
pub mod health;
pub mod probe;
pub mod store;

pub use alerts::{
    Alert, AlertDispatcher, AlertSeverity, EmailSender, LogSender, NotificationSender,
    SlackSender, WebhookSender,
};
pub use health::{CheckResult, HealthReport, HealthState};
pub use probe::{MetricSnapshot, ResourceProbe, SysinfoProbe};
pub use store::SnapshotStore;

use crate::degradation::DegradationTracker;
use chrono::Utc;
use common::{MonitoringConfig, SniffConfig};
use futures::future::join_all;
use parking_lot::Mutex;
use sniff_core::{SniffError, SniffResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct MonitoringSystem {
    settings: MonitoringConfig,
    retention_days: u32,
    probe: Arc<dyn ResourceProbe>,
    dispatcher: AlertDispatcher,
    store: SnapshotStore,
    degradation: DegradationTracker,
    http: reqwest::Client,
    cancel: Mutex<Option<CancellationToken>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitoringSystem {
    pub fn new(config: &SniffConfig, degradation: DegradationTracker) -> SniffResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SniffError::infrastructure("health_client", e))?;
        Ok(Self {
            settings: config.monitoring.clone(),
            retention_days: config.retention_days,
            probe: Arc::new(SysinfoProbe::new()),
            dispatcher: AlertDispatcher::from_config(&config.notifications)?,
            store: SnapshotStore::new(config, degradation.clone()),
            degradation,
            http,
            cancel: Mutex::new(None),
            loops: Mutex::new(Vec::new()),
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    pub fn start(self: &Arc<Self>) {
        let token = {
            let mut cancel = self.cancel.lock();
            if cancel.is_some() {
                warn!("Monitoring is already running");
                return;
            }
            let token = CancellationToken::new();
            *cancel = Some(token.clone());
            token
        };

        let metrics = Arc::clone(self);
        let health = Arc::clone(self);
        let cleanup = Arc::clone(self);
        let handles = vec![
            tokio::spawn(every(
                "metrics",
                seconds(self.settings.metrics_interval_seconds),
                token.clone(),
                move || {
                    let this = Arc::clone(&metrics);
                    async move {
                        if let Err(e) = this.collect_metrics_once().await {
                            error!(error = %e, "Metric collection failed");
                        }
                    }
                },
            )),
            tokio::spawn(every(
                "health",
                seconds(self.settings.health_interval_seconds),
                token.clone(),
                move || {
                    let this = Arc::clone(&health);
                    async move {
                        this.run_health_check_once().await;
                    }
                },
            )),
            tokio::spawn(every(
                "cleanup",
                seconds(self.settings.cleanup_interval_seconds),
                token,
                move || {
                    let this = Arc::clone(&cleanup);
                    async move {
                        this.cleanup_once().await;
                    }
                },
            )),
        ];
        self.loops.lock().extend(handles);
        info!(
            metrics_interval = self.settings.metrics_interval_seconds,
            health_interval = self.settings.health_interval_seconds,
            cleanup_interval = self.settings.cleanup_interval_seconds,
            "Monitoring started"
        );
    }

    pub async fn stop(&self) {
        let token = self.cancel.lock().take();
        let Some(token) = token else {
            return;
        };
        token.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.loops.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Monitoring loop ended abnormally");
            }
        }
        info!("Monitoring stopped");
    }

    async fn sample(&self) -> SniffResult<MetricSnapshot> {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || MetricSnapshot::sample(probe.as_ref()))
            .await
            .map_err(|e| SniffError::Internal(format!("resource probe failed: {}", e)))
    }

    pub async fn collect_metrics_once(&self) -> SniffResult<MetricSnapshot> {
        let snapshot = self.sample().await?;
        debug!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            disk = snapshot.disk_percent,
            "Metrics collected"
        );
        self.store.save_metrics(&snapshot).await;
        Ok(snapshot)
    }

    /// One health pass. Every breached check produces exactly one alert,
    /// which is persisted before the report is returned.
    pub async fn run_health_check_once(&self) -> HealthReport {
        let mut checks = Vec::new();
        let mut alerts = Vec::new();

        match self.sample().await {
            Ok(sample) => {
                for (name, value, threshold) in [
                    ("cpu", sample.cpu_percent, self.settings.cpu_threshold),
                    ("memory", sample.memory_percent, self.settings.memory_threshold),
                    ("disk", sample.disk_percent, self.settings.disk_threshold),
                ] {
                    let check = CheckResult::threshold(name, value, threshold);
                    if check.is_breach() {
                        alerts.push(
                            Alert::new(
                                AlertSeverity::High,
                                name,
                                format!("{} usage high", name),
                                check.message.clone(),
                            )
                            .with_reading(value, threshold),
                        );
                    }
                    checks.push(check);
                }
            }
            Err(e) => {
                error!(error = %e, "Resource sampling failed during health check");
                checks.push(CheckResult {
                    name: "resources".to_string(),
                    status: HealthState::Degraded,
                    message: e.to_string(),
                    value: None,
                    threshold: None,
                });
            }
        }

        let services = join_all(
            self.settings
                .services
                .iter()
                .map(|service| health::check_service(service, &self.http)),
        )
        .await;
        for check in services {
            if check.is_breach() {
                alerts.push(Alert::new(
                    AlertSeverity::Medium,
                    check.name.clone(),
                    format!("{} unreachable", check.name),
                    check.message.clone(),
                ));
            }
            checks.push(check);
        }

        let degraded: Vec<String> = self
            .degradation
            .drain()
            .into_iter()
            .map(|entry| format!("{}: {}", entry.operation, entry.reason))
            .collect();
        if !degraded.is_empty() {
            alerts.push(Alert::new(
                AlertSeverity::Low,
                "infrastructure",
                "Infrastructure degraded",
                degraded.join("; "),
            ));
        }

        let mut status = HealthState::worst(checks.iter().map(|c| c.status));
        if !degraded.is_empty() {
            status = status.max(HealthState::Degraded);
        }

        for alert in &alerts {
            self.store.save_alert(alert).await;
            let dispatcher = self.dispatcher.clone();
            let alert = alert.clone();
            // delivery must never hold up the health loop
            tokio::spawn(async move {
                dispatcher.dispatch(&alert).await;
            });
        }

        let report = HealthReport {
            timestamp: Utc::now(),
            status,
            checks,
            degraded,
            alerts_raised: alerts.len(),
        };
        self.store.save_health(&report).await;
        info!(status = ?report.status, alerts = report.alerts_raised, "Health check finished");
        report
    }

    pub async fn cleanup_once(&self) -> usize {
        self.store.cleanup(self.retention_days).await
    }
}

fn seconds(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

async fn every<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => tick().await,
        }
    }
    debug!(loop_name = name, "Monitoring loop exited");
}
