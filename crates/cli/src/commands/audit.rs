use super::RunContext;
use crate::output;
use anyhow::Result;
use clap::Args;
use console::style;
use std::process::ExitCode;

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Show only the most recent entries
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Drop entries older than the retention window
    #[arg(long)]
    pub prune: bool,

    /// Retention window for --prune; defaults to retention_days from config
    #[arg(long, requires = "prune")]
    pub days: Option<u32>,
}

impl AuditCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let orchestrator = context.orchestrator().await?;

        if self.prune {
            let days = self.days.unwrap_or(context.config.retention_days);
            let removed = orchestrator.prune_audit(days).await;
            orchestrator.shutdown().await;
            let removed = removed?;
            if context.json() {
                output::print_json(&serde_json::json!({ "removed": removed, "days": days }))?;
            } else {
                println!(
                    "{} removed {} audit entries older than {} days",
                    style("✓").green().bold(),
                    removed,
                    days
                );
            }
            return Ok(ExitCode::SUCCESS);
        }

        let entries = orchestrator.audit_entries().await;
        orchestrator.shutdown().await;
        let skip = self
            .limit
            .map(|limit| entries.len().saturating_sub(limit))
            .unwrap_or(0);
        let shown = &entries[skip..];

        if context.json() {
            output::print_json(&shown)?;
        } else if shown.is_empty() {
            println!("{}", style("Audit trail is empty").dim());
        } else {
            output::print_audit(shown);
        }
        Ok(ExitCode::SUCCESS)
    }
}
