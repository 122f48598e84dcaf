use super::{exit_code, RunContext};
use crate::output::{self, spinner};
use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;
use sniff_core::{FixReport, FixSuggestion, Issue};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Args)]
pub struct FixCommand {
    /// File to sniff and fix
    pub path: PathBuf,

    /// Domains to run (comma separated); all registered domains when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub domain: Vec<String>,

    /// Only print scored suggestions, leave the file untouched
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
struct DryRun<'a> {
    issues: &'a [Issue],
    suggestions: &'a [FixSuggestion],
}

impl FixCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let orchestrator = context.orchestrator().await?;

        let progress = spinner(&format!("Sniffing {}...", self.path.display()));
        let result = orchestrator.run_file_sniffing(&self.path, &self.domain).await;
        progress.finish_and_clear();

        if let Some(error) = &result.error {
            orchestrator.shutdown().await;
            if context.json() {
                output::print_json(&result)?;
            } else {
                output::print_aggregated(&result);
            }
            info!(error = %error, "Nothing to fix");
            return Ok(ExitCode::FAILURE);
        }

        let issues: Vec<Issue> = result.issues().filter(|i| !i.fixed).cloned().collect();
        if issues.is_empty() {
            orchestrator.shutdown().await;
            if context.json() {
                output::print_json(&FixReport::default())?;
            } else {
                println!("{} no issues to fix", style("✓").green().bold());
            }
            return Ok(ExitCode::SUCCESS);
        }

        if self.dry_run {
            let suggestions = orchestrator.suggest_fixes(&issues).await;
            orchestrator.shutdown().await;
            if context.json() {
                output::print_json(&DryRun {
                    issues: &issues,
                    suggestions: &suggestions,
                })?;
            } else {
                output::print_aggregated(&result);
                output::print_fix_report(&FixReport {
                    suggestions,
                    ..FixReport::default()
                });
            }
            return Ok(ExitCode::SUCCESS);
        }

        let progress = spinner(&format!("Fixing {} issues...", issues.len()));
        let report = orchestrator.fix_issues(issues).await;
        progress.finish_and_clear();
        orchestrator.shutdown().await;

        if context.json() {
            output::print_json(&report)?;
        } else {
            output::print_fix_report(&report);
        }
        Ok(exit_code(report.failed.is_empty()))
    }
}
