//! Cadence: scheduled image bot for Telegram
//!
//! Main binary with subcommands:
//! - `run`: Poll for updates and deliver subscriptions
//! - `subscriptions`: Print stored subscriptions as JSON lines

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence::config::{BotConfig, RunArgs};
use cadence::daemon;
use cadence_store::SqliteStore;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Scheduled image bot for Telegram", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run(RunArgs),

    /// Print stored subscriptions, one JSON object per line
    Subscriptions {
        /// SQLite database path
        #[arg(long, env = "CADENCE_DB_PATH")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "cadence=info,cadence_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = BotConfig::try_from(args).into_diagnostic()?;
            daemon::run(config).await
        }
        Commands::Subscriptions { db_path } => print_subscriptions(&db_path),
    }
}

fn print_subscriptions(db_path: &Path) -> Result<()> {
    let store = SqliteStore::open(db_path)
        .map_err(|e| miette::miette!("failed to open database: {}", e))?;
    let subscriptions = store
        .list_subscriptions()
        .map_err(|e| miette::miette!("failed to list subscriptions: {}", e))?;

    for subscription in subscriptions {
        println!("{}", serde_json::to_string(&subscription).into_diagnostic()?);
    }
    Ok(())
}
