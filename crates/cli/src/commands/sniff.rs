use super::{collect_files, exit_code, RunContext};
use crate::output::{self, spinner};
use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Args)]
pub struct FileCommand {
    /// File to sniff
    pub path: PathBuf,

    /// Domains to run (comma separated); all registered domains when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub domain: Vec<String>,
}

impl FileCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let orchestrator = context.orchestrator().await?;

        let progress = spinner(&format!("Sniffing {}...", self.path.display()));
        let result = orchestrator.run_file_sniffing(&self.path, &self.domain).await;
        progress.finish_and_clear();
        orchestrator.shutdown().await;

        if context.json() {
            output::print_json(&result)?;
        } else {
            output::print_aggregated(&result);
        }
        Ok(exit_code(result.is_success()))
    }
}

#[derive(Debug, Args)]
pub struct DomainCommand {
    /// Domain to run, e.g. security
    pub domain: String,

    /// Files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl DomainCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let files = collect_files(&self.paths);
        let orchestrator = context.orchestrator().await?;

        let progress = spinner(&format!(
            "Sniffing {} files for {}...",
            files.len(),
            self.domain
        ));
        let report = orchestrator.run_domain_sniffing(&self.domain, &files).await;
        progress.finish_and_clear();
        orchestrator.shutdown().await;

        if context.json() {
            output::print_json(&report)?;
        } else {
            output::print_domain_report(&report);
        }
        Ok(exit_code(
            report.status == sniff_core::AnalysisStatus::Success,
        ))
    }
}

#[derive(Debug, Args)]
pub struct HookCommand {
    /// Changed files; directories are expanded
    pub paths: Vec<PathBuf>,

    /// Read additional paths from stdin, one per line (git diff --name-only)
    #[arg(long)]
    pub stdin: bool,
}

impl HookCommand {
    pub async fn execute(&self, context: &RunContext) -> Result<ExitCode> {
        let mut paths = self.paths.clone();
        if self.stdin {
            for line in io::stdin().lock().lines() {
                let line = line.context("Failed to read paths from stdin")?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    paths.push(PathBuf::from(trimmed));
                }
            }
        }

        // Deleted files show up in the changed list but have nothing to sniff
        let files: Vec<PathBuf> = collect_files(&paths)
            .into_iter()
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    debug!(file = %path.display(), "Skipping removed file");
                }
                exists
            })
            .collect();

        let orchestrator = context.orchestrator().await?;
        let progress = spinner(&format!("Checking {} changed files...", files.len()));
        let outcome = orchestrator.run_hook(&files).await;
        progress.finish_and_clear();
        orchestrator.shutdown().await;

        if context.json() {
            output::print_json(&outcome)?;
        } else {
            output::print_hook_outcome(&outcome);
        }
        Ok(exit_code(outcome.passed))
    }
}
