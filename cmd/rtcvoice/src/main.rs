//! rtcvoice CLI - talk to a realtime voice model over WebRTC.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ChatCommand, ConfigCommand};

/// rtcvoice CLI - realtime voice sessions over WebRTC.
///
/// Configuration is stored in ~/.rtcvoice/rtcvoice/ and supports multiple contexts,
/// similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "rtcvoice")]
#[command(about = "Realtime WebRTC voice session CLI tool")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.rtcvoice/rtcvoice/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Start an interactive voice session
    Chat(ChatCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli).await,
        Commands::Chat(cmd) => cmd.run(&cli).await,
    }
}
