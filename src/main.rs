use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use catsflats::api;
use catsflats::core::{config::Config, logging};

#[derive(Parser)]
#[command(name = "catsflats", version, about = "Cats & Flats backend")]
struct AppCli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override API_PORT from the environment
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = AppCli::parse();
    let mut config = Config::from_env()?;
    if let Some(Commands::Serve { port: Some(port) }) = args.command {
        config.http.port = port;
    }

    info!(port = config.http.port, "starting Cats & Flats API");
    api::server::serve(config).await
}
