use clap::{Parser, Subcommand};

use settings_sync_cli::commands::sync_cmd::{self, SyncCommands};
use settings_sync_cli::errors::Error;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// settings-sync CLI: Apply declarative settings to the repositories of a GitHub organization
#[derive(Parser)]
#[command(name = "settings-sync")]
#[command(about = "Apply declarative settings to the repositories of a GitHub organization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Sync(SyncCommands),

    /// Show the CLI version
    Version,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_env("SETTINGS_SYNC_LOG"))
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Sync(cmd) => match sync_cmd::execute(cmd).await {
            Ok(()) => std::process::exit(0),
            Err(e @ Error::Engine(_)) => {
                error!("Error: {e}");
                std::process::exit(1);
            }
            Err(e) => {
                error!("Error: {e}");
                std::process::exit(2);
            }
        },
        Commands::Version => {
            println!(
                "settings-sync version {}",
                option_env!("SETTINGS_SYNC_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
            );
        }
    }
}
