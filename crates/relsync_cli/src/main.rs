//! relsync CLI
//!
//! Command-line tools for the relationship sync engine.
//!
//! # Commands
//!
//! - `simulate` - Run one relationship mutation against scripted partners
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// relsync command-line tools.
#[derive(Parser)]
#[command(name = "relsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update one relationship and follow its synchronization
    Simulate(commands::simulate::SimulateArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate(args) => {
            commands::simulate::run(&args).await?;
        }
        Commands::Version => {
            println!("relsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("relsync core v{}", relsync_core::VERSION);
        }
    }

    Ok(())
}
