mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Dump => commands::dump(&cli.config).await,
        Command::Serve { bind, port } => commands::serve(&cli.config, bind, port).await,
        Command::Status { api_url } => commands::status(api_url).await,
    }
}
