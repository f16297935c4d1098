use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "monsync", about = "Monitoring-state synchronizer", version)]
pub struct Cli {
    /// Path to the writer's TOML config file.
    #[arg(long, env = "MONSYNC_CONFIG", default_value = "monsync.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Force a full dump to the remote store and exit.
    Dump,

    /// Run the writer: attach the event router and serve the ambient HTTP surface.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },

    /// Print queue depth and connection health from a running instance.
    Status {
        #[arg(long, env = "MONSYNC_API_URL", default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },
}
