//! shipit CLI tool.

use clap::{Parser, Subcommand};
use shipit_core::TriggerEvent;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Build and publish release images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a run for a repository event
    Run {
        /// Path to the configuration file
        #[arg(long, env = "SHIPIT_CONFIG", default_value = "shipit.kdl")]
        config: String,
        /// Event starting the run ("dispatch" or "release:<action>")
        #[arg(long)]
        event: String,
        /// Path to the repository working copy
        #[arg(long, default_value = ".")]
        repo: String,
    },
    /// Execute a manually dispatched run
    Dispatch {
        /// Path to the configuration file
        #[arg(long, env = "SHIPIT_CONFIG", default_value = "shipit.kdl")]
        config: String,
        /// Path to the repository working copy
        #[arg(long, default_value = ".")]
        repo: String,
    },
    /// Validate a pipeline configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "shipit.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            event,
            repo,
        } => {
            let event: TriggerEvent = event.parse()?;
            commands::run::run(&config, event, &repo).await?;
        }
        Commands::Dispatch { config, repo } => {
            commands::run::run(&config, TriggerEvent::Dispatch, &repo).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
