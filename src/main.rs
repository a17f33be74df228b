use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsloom::config::Config;
use newsloom::scheduler::FrequencyTier;

mod commands;

#[derive(Parser)]
#[command(
    name = "newsloom",
    version,
    about = "Adaptive multi-source content ingestion",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the due-scan loop until Ctrl-C
    Run {
        /// Write a Prometheus text snapshot of all metrics here on shutdown
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Fetch a single source now
    Fetch {
        /// Source id
        id: String,

        /// Bypass a fresh cache entry
        #[arg(short, long, default_value = "false")]
        force: bool,
    },

    /// List sources with status and cache state
    Sources,

    /// Fetch every source of a frequency tier (high, medium, low)
    Tier {
        tier: FrequencyTier,
    },

    /// Print the merged feed of cached items
    Feed {
        /// Maximum number of items
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::debug!(config = ?config, "Configuration loaded");

    match cli.command {
        Commands::Run { metrics_file } => {
            tracing::info!("Starting scheduler");
            commands::run(config, metrics_file).await?;
        }

        Commands::Fetch { id, force } => {
            tracing::info!(source_id = %id, force, "Starting fetch command");
            commands::fetch(config, id, force).await?;
        }

        Commands::Sources => {
            commands::sources(config).await?;
        }

        Commands::Tier { tier } => {
            tracing::info!(tier = %tier, "Starting tier command");
            commands::tier(config, tier).await?;
        }

        Commands::Feed { limit } => {
            commands::feed(config, limit).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("newsloom=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("newsloom={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
    }

    Ok(())
}
