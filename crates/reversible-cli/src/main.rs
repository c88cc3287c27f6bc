//! Reversible operator CLI.
//!
//! Inspect the rollback policies a deployment would register, show the
//! effective configuration, and walk through a preview/confirm/execute
//! round trip against in-memory collaborators.
//!
//! # Quick Start
//!
//! ```bash
//! # What can and cannot be undone
//! reversible policies
//! reversible policies --irreversible
//!
//! # Effective configuration for a project directory
//! reversible config show --project . --format toml
//! reversible config show --no-user-config
//!
//! # Publish an event, then undo it
//! reversible demo
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reversible_config::ConfigLoader;
use tracing_subscriber::EnvFilter;

/// Reversible - policy-driven undo for audited changes.
#[derive(Parser)]
#[command(name = "reversible")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory containing reversible.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Log at debug level regardless of the configured filter.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ignore the per-user configuration file.
    #[arg(long, global = true)]
    no_user_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered rollback policies.
    Policies {
        /// Only show actions that can never be undone.
        #[arg(long)]
        irreversible: bool,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Publish a demo event and undo it through preview, confirmation and execution.
    Demo {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Text)]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Text,
    Json,
    Toml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new().with_project_dir(&cli.project);
    if cli.no_user_config {
        loader = loader.without_user_config();
    }
    let layers = loader.layers();
    let config = loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", cli.project.display()))?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.logging.filter)
            .with_context(|| format!("Invalid logging.filter: {}", config.logging.filter))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Policies {
            irreversible,
            format,
        } => commands::policies::run(&config, irreversible, format),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(&layers, &config, format),
        },
        Commands::Demo { format } => commands::demo::run(&config, format),
    }
}
