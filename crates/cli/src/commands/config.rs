use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use common::{ConfigSource, ConfigValidator, SniffConfig};
use console::style;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Write a configuration file populated with defaults
    #[command(alias = "gen")]
    Generate {
        #[arg(short, long, default_value = ".sniffrc.toml")]
        output: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = FileFormat::Toml)]
        file_format: FileFormat,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the resolved configuration
    #[command(alias = "check")]
    Validate,

    /// Print the resolved configuration
    Show {
        #[arg(short = 'f', long, value_enum, default_value_t = FileFormat::Toml)]
        file_format: FileFormat,
    },
}

/// Syntax of a configuration file. Kept apart from the global `--format`,
/// which selects how results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFormat {
    Toml,
    Json,
}

impl ConfigCommand {
    /// `config` is what the loader resolved; `source` tells where it came from
    pub async fn execute(&self, config: &SniffConfig, source: ConfigSource) -> Result<ExitCode> {
        match &self.command {
            ConfigSubcommand::Generate {
                output,
                file_format,
                force,
            } => generate(output, *file_format, *force).await,
            ConfigSubcommand::Validate => validate(config, &source),
            ConfigSubcommand::Show { file_format } => {
                println!("{}", render(config, *file_format)?);
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn render(config: &SniffConfig, format: FileFormat) -> Result<String> {
    match format {
        FileFormat::Toml => {
            toml::to_string_pretty(config).context("Failed to serialize configuration")
        }
        FileFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")
        }
    }
}

async fn generate(output: &Path, format: FileFormat, force: bool) -> Result<ExitCode> {
    if output.exists() && !force {
        warn!(path = %output.display(), "Configuration file already exists");
        bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }

    let content = render(&SniffConfig::default(), format)?;
    tokio::fs::write(output, content)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(path = %output.display(), "Configuration generated");
    println!(
        "{} configuration written to {}",
        style("✓").green().bold(),
        output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn validate(config: &SniffConfig, source: &ConfigSource) -> Result<ExitCode> {
    let origin = match source {
        ConfigSource::File(path) => path.display().to_string(),
        ConfigSource::Default => "built-in defaults".to_string(),
    };
    match ConfigValidator::new().validate(config) {
        Ok(()) => {
            println!("{} configuration is valid ({})", style("✓").green().bold(), origin);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{} {} ({})", style("✗").red().bold(), e, origin);
            Ok(ExitCode::FAILURE)
        }
    }
}
