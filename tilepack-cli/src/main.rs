//! Tilepack CLI - download and manage offline map regions.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::download::DownloadArgs;
use error::CliError;
use runner::CliRunner;
use tilepack::region::RegionId;

#[derive(Parser)]
#[command(name = "tilepack")]
#[command(version, about = "Download and manage offline map regions", long_about = None)]
struct Cli {
    /// Config file (default: ~/.tilepack/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a region and follow its progress (Ctrl+C suspends it)
    Download {
        /// Bounding box as S,W,N,E in degrees
        #[arg(long, allow_hyphen_values = true)]
        bounds: String,

        /// Style URL to prefetch
        #[arg(long)]
        style: String,

        #[arg(long, default_value = "0")]
        min_zoom: f64,

        #[arg(long)]
        max_zoom: f64,

        /// Metadata entry as key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,

        /// Print the record and progress events as JSON
        #[arg(long)]
        json: bool,
    },

    /// List downloaded regions
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete a region (its pack is suspended first)
    Delete { id: RegionId },

    /// Pause a region's download
    Suspend { id: RegionId },

    /// Continue a suspended download
    Resume {
        id: RegionId,

        #[arg(long)]
        json: bool,
    },

    /// Replace a region's metadata
    UpdateMetadata {
        id: RegionId,

        /// Metadata entry as key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },

    /// Import the regions of another pack store file
    Merge { path: PathBuf },

    /// Install a prebuilt pack store, replacing every existing region
    Install { path: PathBuf },

    /// Set the per-region tile count limit (0 = unlimited)
    Limit { limit: u64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Download {
            bounds,
            style,
            min_zoom,
            max_zoom,
            meta,
            json,
        } => {
            commands::download::run(
                &runner,
                DownloadArgs {
                    bounds,
                    style,
                    min_zoom,
                    max_zoom,
                    meta,
                    json,
                },
            )
            .await
        }
        Commands::List { json } => commands::regions::list(&runner, json).await,
        Commands::Delete { id } => commands::regions::delete(&runner, id).await,
        Commands::Suspend { id } => commands::regions::suspend(&runner, id).await,
        Commands::Resume { id, json } => commands::download::resume(&runner, id, json).await,
        Commands::UpdateMetadata { id, meta } => {
            commands::regions::update_metadata(&runner, id, &meta).await
        }
        Commands::Merge { path } => commands::regions::merge(&runner, path).await,
        Commands::Install { path } => commands::regions::install(&runner, path).await,
        Commands::Limit { limit } => {
            commands::regions::limit(&runner, cli.config.as_deref(), limit)
        }
    }
}
