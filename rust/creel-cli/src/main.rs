//! The `creel` command line client.

mod commands;
mod config;
mod identity;
mod presets;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "creel",
    version,
    about = "A client for the creel storage network",
    long_about = "UCAN 1.0 compatible client for the creel storage network"
)]
struct Cli {
    /// Config file path. Attempts to load from the user config
    /// directory if not set, e.g. ~/.config/creel/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Client data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to a file containing the base58-encoded ed25519 identity seed
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// Network the client will operate on. Sets default values for
    /// service DIDs and URLs.
    #[arg(long, global = true, hide = true)]
    network: Option<String>,

    /// [Advanced] DID of the upload service. Use --network to set
    /// proper defaults.
    #[arg(long, global = true, hide = true)]
    upload_service_id: Option<String>,

    /// [Advanced] URL of the upload service. Use --network to set
    /// proper defaults.
    #[arg(long, global = true, hide = true)]
    upload_service_url: Option<String>,

    /// [Advanced] DID of the indexing service. Use --network to set
    /// proper defaults.
    #[arg(long, global = true, hide = true)]
    indexing_service_id: Option<String>,

    /// [Advanced] URL of the indexing service. Use --network to set
    /// proper defaults.
    #[arg(long, global = true, hide = true)]
    indexing_service_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage spaces
    #[command(subcommand)]
    Space(SpaceCommands),

    /// Upload a file to the creel storage network
    #[command(alias = "up")]
    Upload {
        /// DID of the space to upload into
        space: String,

        /// File to upload; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SpaceCommands {
    /// Create a new space
    Create {
        /// Human-readable name for the space
        name: Option<String>,
    },

    /// List known spaces
    #[command(alias = "ls")]
    List,

    /// Remove delegations for a space
    #[command(alias = "rm")]
    Remove {
        /// DID of the space to remove
        space: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = config::resolve(&cli)?;

    match &cli.command {
        Commands::Space(SpaceCommands::Create { name }) => {
            commands::space::create(&config, name.as_deref()).await
        }
        Commands::Space(SpaceCommands::List) => commands::space::list(&config).await,
        Commands::Space(SpaceCommands::Remove { space }) => {
            commands::space::remove(&config, space).await
        }
        Commands::Upload { space, file } => {
            commands::upload::run(&config, space, file.as_deref()).await
        }
    }
}

fn init_logging() {
    // Quiet by default, the interesting modules at info; RUST_LOG wins.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,creel_client=info,creel_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
