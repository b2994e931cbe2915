//! RagBot CLI: the main entry point.
//!
//! Commands:
//! - `onboard` Write a default config file
//! - `chat`    Ask questions from the terminal (single message or interactive)
//! - `serve`   Run the Telegram bot
//! - `doctor`  Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragbot",
    about = "RagBot: answers questions from a document index",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create ~/.ragbot/config.toml with defaults
    Onboard,

    /// Ask questions from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the documents each answer was grounded on
        #[arg(long)]
        sources: bool,
    },

    /// Run the Telegram bot until interrupted
    Serve,

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message, sources } => commands::chat::run(message, sources).await?,
        Commands::Serve => commands::serve::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
