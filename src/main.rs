use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod server;

use cli::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Backend(backend::BackendCommands),
    /// Show the upstream repositories a pull-through of a stream would search
    Candidates {
        /// Stream resource as JSON or YAML
        #[arg(long, short)]
        file: PathBuf,
        /// Host of this registry; history entries on it are ignored.
        /// Defaults to `registry.local_hostname` from the configuration.
        #[arg(long)]
        local_registry: Option<String>,
        /// Use each tag's previous image instead of its current one
        #[arg(long)]
        secondary: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backend(backend_cmd) => backend::handle_backend_command(backend_cmd).await,
        Commands::Candidates {
            file,
            local_registry,
            secondary,
            json,
        } => {
            let local_registry =
                local_registry.unwrap_or_else(candidates::configured_local_registry);
            candidates::handle_candidates(&file, &local_registry, secondary, json)
        }
    }
}
