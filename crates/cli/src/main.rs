use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use common::{init_structured_logging, ConfigLoader, ConfigValidator, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

mod commands;
mod output;

use commands::{
    AuditCommand, ConfigCommand, DomainCommand, FileCommand, FixCommand, HookCommand,
    MonitorCommand, RunContext,
};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "sniff")]
#[command(about = "Continuous code sniffing: analyze, fix and audit source files")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to .sniffrc.toml, sniff.toml, sniff.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log lines on stdout
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sniff one file across domains
    File(FileCommand),
    /// Sniff many files for a single domain
    Domain(DomainCommand),
    /// Sniff a file and apply the fixes analyzers know about
    Fix(FixCommand),
    /// Git-hook entry point; exits non-zero unless every file passes
    Hook(HookCommand),
    /// Run host monitoring loops or a single health pass
    Monitor(MonitorCommand),
    /// Show or prune the audit trail
    Audit(AuditCommand),
    /// Generate, validate or show configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let (config, source) = loader.load().await.context("Failed to load configuration")?;

    let mut logging = LoggingConfig::from_settings(&config.logging);
    if cli.verbose {
        logging.level = Level::DEBUG;
    }
    if cli.json_logs {
        logging.json_output = true;
    }
    init_structured_logging(logging)?;
    tracing::debug!(source = ?source, "Configuration loaded");

    if let Commands::Config(command) = &cli.command {
        return command.execute(&config, source).await;
    }

    ConfigValidator::new()
        .validate(&config)
        .context("Invalid configuration")?;
    let context = RunContext::new(config, cli.format);

    match cli.command {
        Commands::File(command) => command.execute(&context).await,
        Commands::Domain(command) => command.execute(&context).await,
        Commands::Fix(command) => command.execute(&context).await,
        Commands::Hook(command) => command.execute(&context).await,
        Commands::Monitor(command) => command.execute(&context).await,
        Commands::Audit(command) => command.execute(&context).await,
        Commands::Config(_) => Ok(ExitCode::SUCCESS),
    }
}
