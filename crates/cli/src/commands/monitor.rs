use super::{exit_code, RunContext};
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use orchestrator::HealthState;
use serde::Serialize;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Args)]
pub struct MonitorCommand {
    /// Collect one metric snapshot and run one health check, then exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Serialize)]
struct MonitorPass {
    metrics: orchestrator::MetricSnapshot,
    health: orchestrator::HealthReport,
}

impl MonitorCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let orchestrator = context.orchestrator().await?;
        let monitoring = orchestrator.monitoring().clone();

        if self.once {
            let metrics = monitoring
                .collect_metrics_once()
                .await
                .context("Failed to collect metrics")?;
            let health = monitoring.run_health_check_once().await;
            orchestrator.shutdown().await;

            let healthy = health.status == HealthState::Healthy;
            if context.json() {
                output::print_json(&MonitorPass { metrics, health })?;
            } else {
                println!(
                    "cpu {:.1}%  memory {:.1}%  disk {:.1}%  load {:.2}",
                    metrics.cpu_percent,
                    metrics.memory_percent,
                    metrics.disk_percent,
                    metrics.load_average
                );
                output::print_health(&health);
            }
            return Ok(exit_code(healthy));
        }

        monitoring.start();
        println!(
            "{} monitoring started, press Ctrl+C to stop",
            style("●").green()
        );
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Interrupt received, stopping monitoring");
        orchestrator.shutdown().await;
        Ok(ExitCode::SUCCESS)
    }
}
