//! tether - operator CLI for the companion lifecycle daemon
//!
//! Registers voice templates, inspects companion mappings and asks the
//! daemon for sweeps and reclaims.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("tether=info".parse()?)
                .add_directive("tether_core=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_cli(&cli);

    match cli.command {
        Commands::Templates(cmd) => commands::templates::execute(cmd, &config).await,
        Commands::Mappings(cmd) => commands::mappings::execute(cmd, &config).await,
        Commands::Sweep { json } => commands::daemon::sweep(json, &config).await,
        Commands::Reclaim { template_id } => {
            commands::daemon::reclaim(&template_id, &config).await
        }
        Commands::Status { json } => commands::status::execute(json, &config).await,
        Commands::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
