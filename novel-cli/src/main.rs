mod cli;
mod process;
mod progress_bar;
mod review;
mod tracker;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    ai_llm_service::telemetry::init("warn,novel_cli=info,novel_analysis=info");
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Process(args) => process::run(args).await,
        Commands::Progress(command) => tracker::run(command),
    }
}
