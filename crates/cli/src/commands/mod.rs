mod audit;
mod config;
mod fix;
mod monitor;
mod sniff;

pub use audit::AuditCommand;
pub use config::ConfigCommand;
pub use fix::FixCommand;
pub use monitor::MonitorCommand;
pub use sniff::{DomainCommand, FileCommand, HookCommand};

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use common::SniffConfig;
use orchestrator::SniffOrchestrator;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use walkdir::WalkDir;

/// Extensions picked up when a directory is given instead of a file
const SOURCE_EXTENSIONS: &[&str] = &["py"];

/// Everything a subcommand needs after configuration is resolved
pub struct RunContext {
    pub config: SniffConfig,
    pub format: OutputFormat,
}

impl RunContext {
    pub fn new(config: SniffConfig, format: OutputFormat) -> Self {
        Self { config, format }
    }

    pub fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Builds the orchestrator with the built-in analyzers and starts its loop
    pub async fn orchestrator(&self) -> Result<SniffOrchestrator> {
        let registry = analyzers::builtin_registry().context("Failed to register analyzers")?;
        let orchestrator = SniffOrchestrator::builder(self.config.clone(), registry)
            .build()
            .await
            .context("Failed to start sniff orchestrator")?;
        orchestrator.start().await;
        Ok(orchestrator)
    }
}

/// Expands directories into the source files beneath them; plain files pass
/// through untouched so validation reports them as given
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let before = files.len();
            files.extend(
                WalkDir::new(path)
                    .follow_links(false)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|file| is_source_file(file)),
            );
            debug!(dir = %path.display(), found = files.len() - before, "Expanded directory");
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

pub fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
